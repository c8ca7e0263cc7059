//! Door launch orchestration and process supervision
//!
//! `DoorOrchestrator` owns the live launch registry. A launch is admitted
//! only after the security-level, daily-quota, and schedule checks pass;
//! rejections happen before any resource is allocated. An accepted launch
//! gets a unique work directory with its drop file, an emulated serial
//! endpoint, and a supervisor task that enforces the time limit and the
//! escalating-termination contract. Cleanup of the work directory is a
//! drop guarantee, so it runs on every exit path including panics.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use portable_pty::{Child, CommandBuilder};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dw_core::config::ServerConfig;
use dw_core::descriptor::DoorDescriptor;
use dw_core::directory::UserDirectory;
use dw_core::error::LaunchError;
use dw_core::events::{EventBus, NodeEvent};
use dw_core::time::{self, elapsed_duration};
use dw_core::types::{DoorOutcome, LaunchId, SessionId, UserProfile};
use dw_protocol::Renderer;

use crate::session::Session;

use super::bridge::SerialBridge;
use super::dropfile::{self, DropFileContext};
use super::serial::SerialChannel;

/// How long a terminated door gets to exit before the force kill
const KILL_GRACE: Duration = Duration::from_secs(2);

/// How often the supervisor polls for process exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Door launch state machine.
///
/// `Starting → Running → Ending → {Completed, Error, TimedOut}`, with the
/// one shortcut `Starting → Error` for launches that never spawn. Nothing
/// ever leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DoorState {
    Starting = 0,
    Running = 1,
    Ending = 2,
    Completed = 3,
    Error = 4,
    TimedOut = 5,
}

impl DoorState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => DoorState::Starting,
            1 => DoorState::Running,
            2 => DoorState::Ending,
            3 => DoorState::Completed,
            4 => DoorState::Error,
            _ => DoorState::TimedOut,
        }
    }

    /// Whether this state has no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DoorState::Completed | DoorState::Error | DoorState::TimedOut
        )
    }

    fn allows(&self, next: DoorState) -> bool {
        matches!(
            (self, next),
            (DoorState::Starting, DoorState::Running)
                | (DoorState::Starting, DoorState::Error)
                | (DoorState::Running, DoorState::Ending)
                | (DoorState::Ending, DoorState::Completed)
                | (DoorState::Ending, DoorState::Error)
                | (DoorState::Ending, DoorState::TimedOut)
        )
    }
}

/// One live (or just-finished) door launch
pub struct DoorSession {
    /// Launch identifier
    pub id: LaunchId,
    /// Owning session
    pub session_id: SessionId,
    /// Descriptor slug
    pub slug: String,
    /// Per-launch work directory holding the drop file
    pub work_dir: PathBuf,
    /// Logical serial endpoint name
    pub endpoint: String,

    state: AtomicU8,
    started_at: u64,
}

impl DoorSession {
    fn new(
        id: LaunchId,
        session_id: SessionId,
        slug: &str,
        work_dir: PathBuf,
        endpoint: String,
    ) -> Self {
        Self {
            id,
            session_id,
            slug: slug.to_string(),
            work_dir,
            endpoint,
            state: AtomicU8::new(DoorState::Starting as u8),
            started_at: time::current_time_millis(),
        }
    }

    /// Current state
    pub fn state(&self) -> DoorState {
        DoorState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Attempt a transition; illegal moves (including any move out of a
    /// terminal state) are refused.
    pub fn advance(&self, next: DoorState) -> bool {
        loop {
            let raw = self.state.load(Ordering::Acquire);
            let current = DoorState::from_raw(raw);
            if !current.allows(next) {
                return false;
            }
            if self
                .state
                .compare_exchange(raw, next as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Wall-clock time since the launch started
    pub fn elapsed(&self) -> Duration {
        elapsed_duration(self.started_at)
    }
}

/// Removes a launch's work directory (drop file included) when dropped.
///
/// The guard travels into the supervisor task, so the directory is
/// reclaimed on every exit path: normal exit, timeout, hangup, spawn
/// failure, even a supervisor panic.
struct WorkDirGuard {
    path: PathBuf,
}

impl Drop for WorkDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove work dir {:?}: {}", self.path, e);
            }
        }
    }
}

/// Launches and supervises door programs across all sessions
pub struct DoorOrchestrator {
    /// Shared with each launch's supervisor task, which deregisters
    /// itself on any terminal state
    launches: Arc<DashMap<LaunchId, Arc<DoorSession>>>,
    next_id: AtomicU32,
    work_root: PathBuf,
    bbs_name: String,
    sysop_name: String,
    directory: Arc<dyn UserDirectory>,
    events: EventBus,
}

impl DoorOrchestrator {
    /// Create an orchestrator for the given configuration
    pub fn new(
        config: &ServerConfig,
        directory: Arc<dyn UserDirectory>,
        events: EventBus,
    ) -> Self {
        Self {
            launches: Arc::new(DashMap::new()),
            next_id: AtomicU32::new(1),
            work_root: config.door_work_dir.clone(),
            bbs_name: config.bbs_name.clone(),
            sysop_name: config.sysop_name.clone(),
            directory,
            events,
        }
    }

    /// Get a launch by ID
    pub fn get(&self, id: LaunchId) -> Option<Arc<DoorSession>> {
        self.launches.get(&id).map(|r| Arc::clone(&r))
    }

    /// List live launches
    pub fn list(&self) -> Vec<Arc<DoorSession>> {
        self.launches.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Number of live launches
    pub fn len(&self) -> usize {
        self.launches.len()
    }

    /// Check if no launches are live
    pub fn is_empty(&self) -> bool {
        self.launches.is_empty()
    }

    /// Launch a door for a session.
    ///
    /// Rejections (security band, daily quota, schedule, busy node) return
    /// before any process, drop file, or endpoint exists. On success the
    /// returned handle resolves to the launch outcome once the door ends;
    /// cancelling the session's token terminates the door through the
    /// escalating policy.
    pub async fn launch(
        &self,
        session: Arc<Session>,
        slug: &str,
        descriptor: &DoorDescriptor,
        caller_input: mpsc::Receiver<Bytes>,
    ) -> Result<JoinHandle<DoorOutcome>, LaunchError> {
        let user = session
            .user()
            .ok_or_else(|| LaunchError::SpawnFailed("no user profile bound".to_string()))?;

        if !descriptor.allows_security(user.security_level) {
            return Err(LaunchError::SecurityLevel {
                min: descriptor.min_security,
                max: descriptor.max_security,
                actual: user.security_level,
            });
        }
        if !descriptor.open_at(time::minute_of_day()) {
            return Err(LaunchError::OutsideSchedule);
        }
        if descriptor.daily_limit > 0 {
            let used = self.directory.usage_today(&user.handle, slug).await;
            if used >= descriptor.daily_limit {
                return Err(LaunchError::QuotaExhausted {
                    limit: descriptor.daily_limit,
                });
            }
        }

        let launch_id = LaunchId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        session.begin_door(launch_id)?;

        match self
            .start_launch(&session, launch_id, slug, descriptor, &user, caller_input)
            .await
        {
            Ok(handle) => Ok(handle),
            Err(e) => {
                session.end_door(launch_id);
                Err(e)
            }
        }
    }

    async fn start_launch(
        &self,
        session: &Arc<Session>,
        launch_id: LaunchId,
        slug: &str,
        descriptor: &DoorDescriptor,
        user: &UserProfile,
        caller_input: mpsc::Receiver<Bytes>,
    ) -> Result<JoinHandle<DoorOutcome>, LaunchError> {
        // Unique per-launch namespace, derived from the session and launch
        // identifiers
        let work_dir = self
            .work_root
            .join(format!("{}-{}", session.id, launch_id));
        std::fs::create_dir_all(&work_dir)
            .map_err(|e| LaunchError::SpawnFailed(format!("work dir: {}", e)))?;
        let guard = WorkDirGuard {
            path: work_dir.clone(),
        };

        let terminal = session.terminal();
        let ctx = DropFileContext {
            bbs_name: self.bbs_name.clone(),
            sysop_name: self.sysop_name.clone(),
            user: user.clone(),
            node: session.id.as_u32(),
            port_name: descriptor.port_name.clone(),
            baud: descriptor.baud,
            ansi: Renderer::for_terminal(&terminal.term_type).is_ansi(),
            rows: terminal.size.rows,
            total_calls: 1,
            last_call_date: time::legacy_date(),
            call_time: time::legacy_time(),
        };
        let dropfile_path = dropfile::write_drop_file(&work_dir, descriptor.dropfile, &ctx)
            .map_err(|e| LaunchError::SpawnFailed(format!("drop file: {}", e)))?;

        let channel = SerialChannel::open(session.id, launch_id, terminal.size)?;
        let door = Arc::new(DoorSession::new(
            launch_id,
            session.id,
            slug,
            work_dir.clone(),
            channel.name().to_string(),
        ));

        let mut cmd = CommandBuilder::new(&descriptor.command);
        for arg in &descriptor.args {
            cmd.arg(substitute_tokens(
                arg,
                &dropfile_path,
                &work_dir,
                session.id.as_u32(),
                &descriptor.port_name,
                descriptor.baud,
            ));
        }
        let cwd = descriptor
            .working_dir
            .clone()
            .unwrap_or_else(|| work_dir.clone());
        cmd.cwd(cwd);

        self.launches.insert(launch_id, Arc::clone(&door));

        let child = match channel.spawn(cmd) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Spawn failed for door {:?}: {}", slug, e);
                door.advance(DoorState::Error);
                self.launches.remove(&launch_id);
                // The guard drops here, reclaiming the drop file
                return Err(e);
            }
        };

        door.advance(DoorState::Running);
        tracing::info!(
            "{} launched door {:?} as {} on endpoint {}",
            session.id,
            slug,
            launch_id,
            door.endpoint
        );
        self.directory.record_usage(&user.handle, slug).await;
        self.events.emit(NodeEvent::DoorStarted {
            session: session.id,
            door: slug.to_string(),
        });

        let ctx = SuperviseContext {
            door: Arc::clone(&door),
            session: Arc::clone(session),
            launches: Arc::clone(&self.launches),
            events: self.events.clone(),
            throttle: descriptor.throttle.then_some(descriptor.baud),
            time_limit: descriptor.time_limit,
        };
        Ok(tokio::spawn(supervise(
            ctx,
            child,
            channel,
            caller_input,
            guard,
        )))
    }
}

/// Everything a launch's supervisor needs once it is detached from the
/// orchestrator call
struct SuperviseContext {
    door: Arc<DoorSession>,
    session: Arc<Session>,
    launches: Arc<DashMap<LaunchId, Arc<DoorSession>>>,
    events: EventBus,
    throttle: Option<u32>,
    time_limit: Duration,
}

/// Supervise a running door until a terminal state.
///
/// Watches for process exit, the per-launch time limit, and session
/// cancellation; whichever fires, the bridge is stopped, the process is
/// terminated if still alive, and the work directory is reclaimed by the
/// guard.
async fn supervise(
    ctx: SuperviseContext,
    mut child: Box<dyn Child + Send + Sync>,
    channel: SerialChannel,
    caller_input: mpsc::Receiver<Bytes>,
    guard: WorkDirGuard,
) -> DoorOutcome {
    enum EndReason {
        Exited(i32),
        TimedOut,
        Cancelled,
    }

    let bridge = SerialBridge::start(
        channel,
        caller_input,
        Arc::clone(&ctx.session),
        ctx.throttle,
    );

    let reason = match bridge {
        Err(e) => {
            tracing::warn!("Bridge failed for {}: {}", ctx.door.id, e);
            let _ = child.kill();
            ctx.door.advance(DoorState::Ending);
            ctx.door.advance(DoorState::Error);
            return finish(&ctx, DoorOutcome::Error, guard);
        }
        Ok(bridge) => {
            let deadline = tokio::time::Instant::now() + ctx.time_limit;
            let mut poll = tokio::time::interval(EXIT_POLL_INTERVAL);
            let reason = loop {
                tokio::select! {
                    _ = poll.tick() => {
                        match child.try_wait() {
                            Ok(Some(status)) => {
                                break EndReason::Exited(status.exit_code() as i32);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!("Wait failed for {}: {}", ctx.door.id, e);
                                break EndReason::Exited(-1);
                            }
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break EndReason::TimedOut,
                    _ = ctx.session.cancel.cancelled() => break EndReason::Cancelled,
                }
            };

            ctx.door.advance(DoorState::Ending);
            bridge.shutdown().await;
            reason
        }
    };

    let outcome = match reason {
        EndReason::Exited(0) => {
            ctx.door.advance(DoorState::Completed);
            DoorOutcome::Completed { exit_code: 0 }
        }
        EndReason::Exited(code) => {
            tracing::warn!("Door {} exited with code {}", ctx.door.id, code);
            ctx.door.advance(DoorState::Error);
            DoorOutcome::Error
        }
        EndReason::TimedOut => {
            tracing::info!("Door {} hit its time limit, terminating", ctx.door.id);
            terminate_child(child.as_mut(), KILL_GRACE).await;
            ctx.door.advance(DoorState::TimedOut);
            DoorOutcome::TimedOut
        }
        EndReason::Cancelled => {
            tracing::info!(
                "Session {} gone, terminating door {}",
                ctx.session.id,
                ctx.door.id
            );
            terminate_child(child.as_mut(), KILL_GRACE).await;
            ctx.door.advance(DoorState::Error);
            DoorOutcome::Error
        }
    };

    finish(&ctx, outcome, guard)
}

/// Common tail for every exit path
fn finish(ctx: &SuperviseContext, outcome: DoorOutcome, guard: WorkDirGuard) -> DoorOutcome {
    let duration = ctx.door.elapsed();
    // Drop file and work dir go away here, unconditionally
    drop(guard);

    ctx.launches.remove(&ctx.door.id);
    ctx.session.end_door(ctx.door.id);
    ctx.events.emit(NodeEvent::DoorEnded {
        session: ctx.session.id,
        door: ctx.door.slug.clone(),
        outcome,
        duration,
    });

    tracing::info!(
        "Door {} for {} finished: {} after {:?}",
        ctx.door.id,
        ctx.session.id,
        outcome,
        duration
    );
    outcome
}

/// Escalating termination: request a graceful stop, wait the grace
/// period, then force-kill and reap.
async fn terminate_child(child: &mut (dyn Child + Send + Sync), grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.process_id() {
        // SAFETY: signalling a pid we spawned and have not reaped yet
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }

    if wait_for_exit(child, grace).await {
        return;
    }

    tracing::warn!("Door process ignored termination request, force killing");
    if let Err(e) = child.kill() {
        tracing::warn!("Kill failed: {}", e);
    }
    if !wait_for_exit(child, KILL_GRACE).await {
        tracing::error!("Door process survived kill; abandoning handle");
    }
}

/// Poll for process exit up to a deadline
async fn wait_for_exit(child: &mut (dyn Child + Send + Sync), within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return true,
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Substitute per-launch tokens into a command-line template
fn substitute_tokens(
    template: &str,
    dropfile: &std::path::Path,
    work_dir: &std::path::Path,
    node: u32,
    port: &str,
    baud: u32,
) -> String {
    template
        .replace("{dropfile}", &dropfile.display().to_string())
        .replace("{dropdir}", &work_dir.display().to_string())
        .replace("{node}", &node.to_string())
        .replace("{port}", port)
        .replace("{baud}", &baud.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use dw_core::descriptor::Schedule;
    use dw_core::directory::MemoryDirectory;
    use tokio_util::sync::CancellationToken;

    fn test_descriptor(command: &str, args: &[&str]) -> DoorDescriptor {
        toml::from_str(&format!(
            r#"
                name = "Test Door"
                command = "{}"
                args = [{}]
                dropfile = "dor_info"
            "#,
            command,
            args.iter()
                .map(|a| format!("{:?}", a))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .unwrap()
    }

    struct Fixture {
        orchestrator: Arc<DoorOrchestrator>,
        session: Arc<Session>,
        directory: Arc<MemoryDirectory>,
        work_root: PathBuf,
        _tmp: tempfile::TempDir,
    }

    fn fixture(security_level: u8) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.door_work_dir = tmp.path().join("doors");

        let directory = Arc::new(MemoryDirectory::new());
        let (events, _rx) = EventBus::new(64);
        let orchestrator = Arc::new(DoorOrchestrator::new(
            &config,
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
            events,
        ));

        let registry = SessionRegistry::new(4);
        let (tx, mut rx) = mpsc::channel(256);
        // Drain the session writer so door output never backs up
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let session = registry
            .admit("127.0.0.1:4000".parse().unwrap(), tx, CancellationToken::new())
            .unwrap();
        session.activate();

        let mut user = UserProfile::guest("CYBER");
        user.security_level = security_level;
        session.set_user(user);

        Fixture {
            orchestrator,
            session,
            directory,
            work_root: config.door_work_dir,
            _tmp: tmp,
        }
    }

    fn work_dir_entries(root: &PathBuf) -> usize {
        match std::fs::read_dir(root) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn test_state_machine_happy_path() {
        let door = DoorSession::new(
            LaunchId::new(1),
            SessionId::new(1),
            "lord",
            PathBuf::from("/tmp/x"),
            "dwtty-1-1".to_string(),
        );

        assert_eq!(door.state(), DoorState::Starting);
        assert!(door.advance(DoorState::Running));
        assert!(door.advance(DoorState::Ending));
        assert!(door.advance(DoorState::Completed));
        assert!(door.state().is_terminal());
    }

    #[test]
    fn test_no_transition_leaves_terminal_state() {
        for terminal in [DoorState::Completed, DoorState::Error, DoorState::TimedOut] {
            let door = DoorSession::new(
                LaunchId::new(1),
                SessionId::new(1),
                "lord",
                PathBuf::from("/tmp/x"),
                "dwtty-1-1".to_string(),
            );
            door.advance(DoorState::Running);
            door.advance(DoorState::Ending);
            assert!(door.advance(terminal));

            for next in [
                DoorState::Starting,
                DoorState::Running,
                DoorState::Ending,
                DoorState::Completed,
                DoorState::Error,
                DoorState::TimedOut,
            ] {
                assert!(!door.advance(next), "{:?} must be terminal", terminal);
            }
        }
    }

    #[test]
    fn test_illegal_shortcuts_refused() {
        let door = DoorSession::new(
            LaunchId::new(1),
            SessionId::new(1),
            "lord",
            PathBuf::from("/tmp/x"),
            "dwtty-1-1".to_string(),
        );
        // Starting cannot jump straight to Completed or TimedOut
        assert!(!door.advance(DoorState::Completed));
        assert!(!door.advance(DoorState::TimedOut));
        // But Starting -> Error is the spawn-failure path
        assert!(door.advance(DoorState::Error));
    }

    #[tokio::test]
    async fn test_security_level_rejection() {
        let f = fixture(40);
        let mut descriptor = test_descriptor("/bin/sh", &["-c", "exit 0"]);
        descriptor.min_security = 50;

        let (_tx, rx) = mpsc::channel(8);
        let result = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await;

        assert!(matches!(
            result,
            Err(LaunchError::SecurityLevel {
                min: 50,
                actual: 40,
                ..
            })
        ));
        // No process, no drop file, no registration
        assert_eq!(work_dir_entries(&f.work_root), 0);
        assert!(f.orchestrator.is_empty());
        assert!(f.session.active_door().is_none());
    }

    #[tokio::test]
    async fn test_quota_rejection() {
        let f = fixture(50);
        let mut descriptor = test_descriptor("/bin/sh", &["-c", "exit 0"]);
        descriptor.daily_limit = 2;

        f.directory.record_usage("CYBER", "test").await;
        f.directory.record_usage("CYBER", "test").await;

        let (_tx, rx) = mpsc::channel(8);
        let result = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await;

        assert!(matches!(
            result,
            Err(LaunchError::QuotaExhausted { limit: 2 })
        ));
        assert_eq!(work_dir_entries(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_schedule_rejection() {
        let f = fixture(50);
        let mut descriptor = test_descriptor("/bin/sh", &["-c", "exit 0"]);
        // A window that is never open
        descriptor.schedule = Some(Schedule {
            open: "03:00".parse().unwrap(),
            close: "03:00".parse().unwrap(),
        });

        let (_tx, rx) = mpsc::channel(8);
        let result = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await;

        assert!(matches!(result, Err(LaunchError::OutsideSchedule)));
        assert_eq!(work_dir_entries(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_busy_node_rejection() {
        let f = fixture(50);
        let descriptor = test_descriptor("/bin/sh", &["-c", "exit 0"]);
        f.session.begin_door(LaunchId::new(99)).unwrap();

        let (_tx, rx) = mpsc::channel(8);
        let result = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await;
        assert!(matches!(result, Err(LaunchError::DoorBusy)));

        // The stranger's claim is untouched
        assert_eq!(f.session.active_door(), Some(LaunchId::new(99)));
    }

    #[tokio::test]
    async fn test_spawn_failure_cleans_up() {
        let f = fixture(50);
        let descriptor = test_descriptor("/nonexistent/door-binary", &[]);

        let (_tx, rx) = mpsc::channel(8);
        let result = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await;

        assert!(matches!(result, Err(LaunchError::SpawnFailed(_))));
        // The drop file was written, then reclaimed by the guard
        assert_eq!(work_dir_entries(&f.work_root), 0);
        assert!(f.orchestrator.is_empty());
        assert!(f.session.active_door().is_none());
        // A failed spawn does not burn quota
        assert_eq!(f.directory.usage_today("CYBER", "test").await, 0);
    }

    #[tokio::test]
    async fn test_successful_run_completes_and_cleans_up() {
        let f = fixture(50);
        let descriptor = test_descriptor("/bin/sh", &["-c", "exit 0"]);

        let (_tx, rx) = mpsc::channel(8);
        let handle = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await
            .unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, DoorOutcome::Completed { exit_code: 0 });
        assert_eq!(work_dir_entries(&f.work_root), 0);
        assert!(f.orchestrator.is_empty());
        assert!(f.session.active_door().is_none());
        assert_eq!(f.directory.usage_today("CYBER", "test").await, 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let f = fixture(50);
        let descriptor = test_descriptor("/bin/sh", &["-c", "exit 3"]);

        let (_tx, rx) = mpsc::channel(8);
        let handle = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await
            .unwrap();

        assert_eq!(handle.await.unwrap(), DoorOutcome::Error);
        assert_eq!(work_dir_entries(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_time_limit_forces_termination() {
        let f = fixture(50);
        let mut descriptor = test_descriptor("/bin/sh", &["-c", "sleep 30"]);
        descriptor.time_limit = Duration::from_millis(400);

        let (_tx, rx) = mpsc::channel(8);
        let handle = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("supervisor never returned")
            .unwrap();
        assert_eq!(outcome, DoorOutcome::TimedOut);
        assert_eq!(work_dir_entries(&f.work_root), 0);
        assert!(f.session.active_door().is_none());
    }

    #[tokio::test]
    async fn test_session_cancel_terminates_door() {
        let f = fixture(50);
        let descriptor = test_descriptor("/bin/sh", &["-c", "sleep 30"]);

        let (_tx, rx) = mpsc::channel(8);
        let handle = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, rx)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        f.session.cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("supervisor never returned")
            .unwrap();
        assert_eq!(outcome, DoorOutcome::Error);
        // Endpoint and drop file reclaimed even though the caller vanished
        assert_eq!(work_dir_entries(&f.work_root), 0);
    }

    #[tokio::test]
    async fn test_concurrent_launches_get_unique_paths() {
        let f = fixture(50);
        let registry = SessionRegistry::new(4);
        let (tx2, mut rx2) = mpsc::channel(256);
        tokio::spawn(async move { while rx2.recv().await.is_some() {} });
        let session2 = registry
            .admit("127.0.0.1:4001".parse().unwrap(), tx2, CancellationToken::new())
            .unwrap();
        session2.set_user(UserProfile::guest("RIVAL"));

        let descriptor = test_descriptor("/bin/sh", &["-c", "sleep 2"]);

        let (_ta, ra) = mpsc::channel(8);
        let (_tb, rb) = mpsc::channel(8);
        let a = f
            .orchestrator
            .launch(Arc::clone(&f.session), "test", &descriptor, ra)
            .await
            .unwrap();
        let b = f
            .orchestrator
            .launch(Arc::clone(&session2), "test", &descriptor, rb)
            .await
            .unwrap();

        let launches = f.orchestrator.list();
        assert_eq!(launches.len(), 2);
        assert_ne!(launches[0].work_dir, launches[1].work_dir);
        assert_ne!(launches[0].endpoint, launches[1].endpoint);
        assert!(launches[0].work_dir.exists());
        assert!(launches[1].work_dir.exists());

        f.session.cancel.cancel();
        session2.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(10), a).await;
        let _ = tokio::time::timeout(Duration::from_secs(10), b).await;
        assert_eq!(work_dir_entries(&f.work_root), 0);
    }
}
