//! Per-connection driver
//!
//! One task owns each caller's connection for its whole life: it runs the
//! option handshake (bounded by the negotiation timeout), binds a user
//! profile, serves the door menu, and pumps caller bytes into a running
//! door. Outbound traffic goes through a single writer task fed by an mpsc
//! channel, so writes to one caller are strictly ordered no matter which
//! component produced them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use dw_core::error::SessionError;
use dw_core::types::{DoorOutcome, UserProfile};
use dw_protocol::negotiate::parse_naws;
use dw_protocol::telnet::option;
use dw_protocol::{
    InputEvent, InputParser, Key, Negotiation, Negotiator, Renderer, TelnetCodec, TelnetFrame,
    TerminalProfile,
};

use crate::state::ServerState;

use super::handle::{Outbound, Session};

type TelnetSink = futures::stream::SplitSink<Framed<TcpStream, TelnetCodec>, TelnetFrame>;
type TelnetStream = futures::stream::SplitStream<Framed<TcpStream, TelnetCodec>>;

/// Longest line the prompt editor will accept
const MAX_LINE: usize = 120;

/// Drive one caller's connection to completion
pub async fn run_session(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) {
    let framed = Framed::new(stream, TelnetCodec::new());
    let (sink, stream) = framed.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(256);

    let session = match state.sessions.admit(peer, outbound_tx, cancel) {
        Ok(session) => session,
        Err(reason) => {
            refuse_connection(sink, &reason).await;
            return;
        }
    };

    let writer = spawn_writer(sink, outbound_rx, Arc::clone(&session));

    let mut announced = false;
    let result = serve_caller(&state, &session, stream, &mut announced).await;
    if let Err(e) = result {
        tracing::debug!("Session {} ended with error: {}", session.id, e);
    }

    // Teardown is idempotent: whoever closed the session first (this task,
    // the sweep, shutdown), the resources are released exactly once here.
    session.try_close();
    state.sessions.remove(session.id);
    session.request_close();
    session.cancel.cancel();
    if announced {
        state.events.emit(dw_core::events::NodeEvent::SessionDisconnected {
            session: session.id,
            duration: session.session_duration(),
        });
    }
    session.mark_closed();

    // Give the writer a moment to flush the farewell, then move on
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
    tracing::info!("Session {} from {} closed", session.id, peer);
}

/// Politely turn away a caller when every node is in use
async fn refuse_connection(mut sink: TelnetSink, reason: &SessionError) {
    tracing::info!("Refusing connection: {}", reason);
    let notice = format!("\r\n{}. Please call back later.\r\n", reason);
    let _ = sink.send(TelnetFrame::Data(Bytes::from(notice))).await;
    let _ = sink.close().await;
}

/// Single writer task per connection: drains the outbound channel in order
fn spawn_writer(
    mut sink: TelnetSink,
    mut rx: mpsc::Receiver<Outbound>,
    session: Arc<Session>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let result = match item {
                Outbound::Data(data) => sink.send(TelnetFrame::Data(data)).await,
                Outbound::Frame(frame) => sink.send(frame).await,
                Outbound::Close => break,
            };
            if let Err(e) = result {
                tracing::debug!("Write failed for {}: {}", session.id, e);
                session.try_close();
                session.cancel.cancel();
                break;
            }
        }
        let _ = sink.close().await;
    })
}

async fn serve_caller(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    mut stream: TelnetStream,
    announced: &mut bool,
) -> Result<(), SessionError> {
    let profile = negotiate(
        session,
        &mut stream,
        state.config.negotiation_timeout,
    )
    .await?;

    tracing::info!(
        "Session {} negotiated: echo={} type={:?} size={}x{}",
        session.id,
        profile.server_echo,
        profile.term_type,
        profile.size.cols,
        profile.size.rows
    );
    session.set_terminal(profile.clone());

    if !session.activate() {
        // The sweep or shutdown got here first
        return Err(SessionError::Closed);
    }
    state.events.emit(dw_core::events::NodeEvent::SessionConnected {
        session: session.id,
        peer: session.peer.to_string(),
    });
    *announced = true;

    let conn = Connection {
        state: Arc::clone(state),
        session: Arc::clone(session),
        stream,
        parser: InputParser::new(),
        renderer: Renderer::for_terminal(&profile.term_type),
        echo: profile.server_echo,
    };
    conn.run().await
}

/// Run the option handshake, falling back to defaults at the deadline
async fn negotiate(
    session: &Arc<Session>,
    stream: &mut TelnetStream,
    timeout: Duration,
) -> Result<TerminalProfile, SessionError> {
    let mut negotiator = Negotiator::new();
    for offer in negotiator.offers() {
        session.send_frame(offer).await?;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if negotiator.is_settled() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                tracing::debug!("Negotiation deadline for {}, applying defaults", session.id);
                break;
            }
            _ = session.cancel.cancelled() => return Err(SessionError::Closed),
            frame = stream.next() => {
                match frame {
                    Some(Ok(frame)) => {
                        session.touch();
                        // Data typed before the handshake settles is not
                        // delivered upward
                        for reply in negotiator.on_frame(&frame) {
                            session.send_frame(reply).await?;
                        }
                    }
                    Some(Err(e)) => {
                        return Err(SessionError::ConnectionLost(e.to_string()));
                    }
                    None => {
                        return Err(SessionError::ConnectionLost(
                            "peer closed during negotiation".to_string(),
                        ));
                    }
                }
            }
        }
    }

    Ok(negotiator.finish())
}

/// The post-negotiation caller interface: login prompt and door menu
struct Connection {
    state: Arc<ServerState>,
    session: Arc<Session>,
    stream: TelnetStream,
    parser: InputParser,
    renderer: Renderer,
    echo: bool,
}

impl Connection {
    async fn run(mut self) -> Result<(), SessionError> {
        self.show_banner().await?;

        let Some(handle) = self.read_line().await? else {
            return Ok(());
        };
        let handle = handle.trim().to_string();
        let handle = if handle.is_empty() {
            "GUEST".to_string()
        } else {
            handle
        };

        let profile = match self.state.directory.lookup(&handle).await {
            Some(profile) => profile,
            None => UserProfile::guest(handle.clone()),
        };
        self.session.set_user(profile.clone());
        self.write_line(&format!(
            "Welcome, {}! You have {} minutes today.",
            profile.handle, profile.time_remaining
        ))
        .await?;

        loop {
            self.show_menu().await?;
            let Some(choice) = self.read_line().await? else {
                return Ok(());
            };
            let choice = choice.trim().to_lowercase();

            match choice.as_str() {
                "" => continue,
                "g" | "goodbye" => {
                    self.write_line("Thanks for calling. Goodbye!").await?;
                    return Ok(());
                }
                slug if self.state.config.doors.contains_key(slug) => {
                    self.run_door(slug).await?;
                }
                other => {
                    self.write_line(&format!("No door named {:?} here.", other))
                        .await?;
                }
            }
        }
    }

    async fn show_banner(&mut self) -> Result<(), SessionError> {
        let mut out = BytesMut::new();
        self.renderer.clear_screen(&mut out);
        self.renderer.set_fg(&mut out, dw_protocol::Color::Cyan, true);
        self.renderer.line(&mut out, &self.state.config.bbs_name);
        self.renderer.reset(&mut out);
        self.renderer
            .line(&mut out, &format!("You are caller on {}.", self.session.id));
        self.renderer.newline(&mut out);
        self.renderer.text(&mut out, "Enter your handle: ");
        self.session.send_data(out.freeze()).await
    }

    async fn show_menu(&mut self) -> Result<(), SessionError> {
        let mut doors: Vec<_> = self.state.config.doors.iter().collect();
        doors.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = BytesMut::new();
        self.renderer.newline(&mut out);
        self.renderer.set_fg(&mut out, dw_protocol::Color::Yellow, true);
        self.renderer.line(&mut out, "-- Doors --");
        self.renderer.reset(&mut out);
        for (slug, descriptor) in doors {
            self.renderer
                .line(&mut out, &format!("  [{}] {}", slug, descriptor.name));
        }
        self.renderer.line(&mut out, "  [G] Log off");
        self.renderer.text(&mut out, "Your choice: ");
        self.session.send_data(out.freeze()).await
    }

    async fn write_line(&mut self, text: &str) -> Result<(), SessionError> {
        let mut out = BytesMut::new();
        self.renderer.line(&mut out, text);
        self.session.send_data(out.freeze()).await
    }

    /// Read one line of input with minimal editing (backspace, echo).
    ///
    /// Returns None when the caller is gone or the session was cancelled.
    async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        let mut line = String::new();
        loop {
            tokio::select! {
                _ = self.session.cancel.cancelled() => return Ok(None),
                frame = self.stream.next() => {
                    let frame = match frame {
                        None => return Ok(None),
                        Some(Err(e)) => {
                            return Err(SessionError::ConnectionLost(e.to_string()));
                        }
                        Some(Ok(frame)) => frame,
                    };

                    let TelnetFrame::Data(data) = frame else {
                        self.handle_control(frame).await?;
                        continue;
                    };

                    self.session.touch();
                    for event in self.parser.push(&data) {
                        match event {
                            InputEvent::Key(Key::Enter) => {
                                if self.echo {
                                    self.session
                                        .send_data(Bytes::from_static(b"\r\n"))
                                        .await?;
                                }
                                return Ok(Some(line));
                            }
                            InputEvent::Key(Key::Backspace) => {
                                if line.pop().is_some() && self.echo {
                                    self.session
                                        .send_data(Bytes::from_static(b"\x08 \x08"))
                                        .await?;
                                }
                            }
                            InputEvent::Byte(b) if (0x20..0x7f).contains(&b) => {
                                if line.len() < MAX_LINE {
                                    line.push(b as char);
                                    if self.echo {
                                        self.session
                                            .send_data(Bytes::copy_from_slice(&[b]))
                                            .await?;
                                    }
                                }
                            }
                            // Arrows and friends mean nothing at a prompt
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    /// Handle non-data frames after negotiation has settled
    async fn handle_control(&mut self, frame: TelnetFrame) -> Result<(), SessionError> {
        match frame {
            TelnetFrame::Subnegotiate(option::NAWS, payload) => {
                if let Some(size) = parse_naws(&payload) {
                    tracing::debug!(
                        "Session {} resized to {}x{}",
                        self.session.id,
                        size.cols,
                        size.rows
                    );
                    self.session.set_size(size);
                }
            }
            TelnetFrame::Negotiate(Negotiation::Will, opt) if !is_known_option(opt) => {
                self.session
                    .send_frame(TelnetFrame::Negotiate(Negotiation::Dont, opt))
                    .await?;
            }
            TelnetFrame::Negotiate(Negotiation::Do, opt) if !is_known_option(opt) => {
                self.session
                    .send_frame(TelnetFrame::Negotiate(Negotiation::Wont, opt))
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Launch a door and pump the caller's bytes into it until it ends
    async fn run_door(&mut self, slug: &str) -> Result<(), SessionError> {
        let descriptor = match self.state.config.doors.get(slug) {
            Some(d) => d.clone(),
            None => return Ok(()),
        };

        let (door_tx, door_rx) = mpsc::channel::<Bytes>(64);
        let launched = self
            .state
            .doors
            .launch(Arc::clone(&self.session), slug, &descriptor, door_rx)
            .await;

        let mut supervisor = match launched {
            Ok(handle) => handle,
            Err(reason) => {
                tracing::info!(
                    "Session {} refused door {:?}: {}",
                    self.session.id,
                    slug,
                    reason
                );
                self.write_line(&format!("Sorry: {}", reason)).await?;
                return Ok(());
            }
        };

        self.write_line(&format!("Loading {} ...", descriptor.name))
            .await?;

        loop {
            tokio::select! {
                result = &mut supervisor => {
                    let outcome = result.unwrap_or(DoorOutcome::Error);
                    let message = match outcome {
                        DoorOutcome::Completed { .. } => {
                            format!("\r\n{} has ended. Returning you to the board.", descriptor.name)
                        }
                        DoorOutcome::TimedOut => {
                            format!("\r\nTime limit reached in {}.", descriptor.name)
                        }
                        DoorOutcome::Error => {
                            format!("\r\n{} ended unexpectedly.", descriptor.name)
                        }
                    };
                    self.write_line(&message).await?;
                    return Ok(());
                }
                frame = self.stream.next() => {
                    match frame {
                        None | Some(Err(_)) => {
                            // Caller hung up mid-door: cancel and wait for the
                            // supervisor to terminate the process and clean up
                            self.session.try_close();
                            self.session.cancel.cancel();
                            let _ = (&mut supervisor).await;
                            return Err(SessionError::ConnectionLost(
                                "peer hung up during door".to_string(),
                            ));
                        }
                        Some(Ok(TelnetFrame::Data(data))) => {
                            self.session.touch();
                            // A closed receiver means the door is already
                            // exiting; the supervisor branch will pick it up
                            let _ = door_tx.send(data).await;
                        }
                        Some(Ok(frame)) => self.handle_control(frame).await?,
                    }
                }
            }
        }
    }
}

fn is_known_option(opt: u8) -> bool {
    matches!(
        opt,
        option::ECHO | option::SUPPRESS_GO_AHEAD | option::TERMINAL_TYPE | option::NAWS
    )
}
