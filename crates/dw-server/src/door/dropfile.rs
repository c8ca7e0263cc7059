//! Legacy drop-file generation
//!
//! A drop file is how session context reaches a door program: a fixed
//! layout the program parses positionally, not by name. Two layouts are
//! supported, each owning its exact field order and formatting. Every line
//! ends in CRLF, including the last one; door programs written against
//! DOS runtimes reject anything else.

use std::io;
use std::path::{Path, PathBuf};

use dw_core::descriptor::DropFileKind;
use dw_core::types::UserProfile;

/// Everything substituted into a drop file for one launch
#[derive(Debug, Clone)]
pub struct DropFileContext {
    /// Board name
    pub bbs_name: String,
    /// Sysop name ("First Last")
    pub sysop_name: String,
    /// The caller
    pub user: UserProfile,
    /// Node number of the owning session
    pub node: u32,
    /// Emulated port name, e.g. "COM1"
    pub port_name: String,
    /// Simulated line speed
    pub baud: u32,
    /// Whether the caller negotiated an ANSI-capable terminal
    pub ansi: bool,
    /// Caller's screen length in rows
    pub rows: u16,
    /// Times this caller has been on the board
    pub total_calls: u32,
    /// Date of this call, MM/DD/YY
    pub last_call_date: String,
    /// Time of this call, HH:MM
    pub call_time: String,
}

/// Render the drop file for a format tag
pub fn render(kind: DropFileKind, ctx: &DropFileContext) -> String {
    match kind {
        DropFileKind::DoorSys => render_door_sys(ctx),
        DropFileKind::DorInfo => render_dorinfo(ctx),
    }
}

/// Render and write the drop file into a launch's work directory
pub fn write_drop_file(
    dir: &Path,
    kind: DropFileKind,
    ctx: &DropFileContext,
) -> io::Result<PathBuf> {
    let path = dir.join(kind.file_name());
    std::fs::write(&path, render(kind, ctx))?;
    Ok(path)
}

/// The 52-line positional GAP `DOOR.SYS` layout.
///
/// Fields the host does not track carry the conventional placeholder
/// values; the line positions are load-bearing.
fn render_door_sys(ctx: &DropFileContext) -> String {
    let seconds_remaining = ctx.user.time_remaining * 60;
    let graphics = if ctx.ansi { "GR" } else { "NG" };

    let lines: [String; 52] = [
        format!("{}:", ctx.port_name),            // 1: comm port
        ctx.baud.to_string(),                     // 2: effective baud
        "8".to_string(),                          // 3: data bits
        ctx.node.to_string(),                     // 4: node number
        ctx.baud.to_string(),                     // 5: locked DTE rate
        "Y".to_string(),                          // 6: screen display
        "N".to_string(),                          // 7: printer toggle
        "N".to_string(),                          // 8: page bell
        "N".to_string(),                          // 9: caller alarm
        ctx.user.real_name.clone(),               // 10: full name
        ctx.user.location.clone(),                // 11: city, state
        "555-555-5555".to_string(),               // 12: voice phone
        "555-555-5555".to_string(),               // 13: data phone
        "SECRET".to_string(),                     // 14: password
        ctx.user.security_level.to_string(),      // 15: security level
        ctx.total_calls.to_string(),              // 16: total times on
        ctx.last_call_date.clone(),               // 17: last call date
        seconds_remaining.to_string(),            // 18: seconds remaining
        ctx.user.time_remaining.to_string(),      // 19: minutes remaining
        graphics.to_string(),                     // 20: graphics mode
        ctx.rows.to_string(),                     // 21: screen length
        "N".to_string(),                          // 22: expert mode
        "0".to_string(),                          // 23: conferences registered
        "0".to_string(),                          // 24: conference exited from
        "12/31/99".to_string(),                   // 25: expiration date
        ctx.node.to_string(),                     // 26: user record number
        "Z".to_string(),                          // 27: default protocol
        "0".to_string(),                          // 28: total uploads
        "0".to_string(),                          // 29: total downloads
        "0".to_string(),                          // 30: daily download K
        "999999".to_string(),                     // 31: max daily download K
        "01/01/80".to_string(),                   // 32: birth date
        "C:\\DOORWAY".to_string(),                // 33: main directory path
        "C:\\DOORWAY".to_string(),                // 34: gen directory path
        ctx.sysop_name.clone(),                   // 35: sysop name
        ctx.user.handle.clone(),                  // 36: alias/handle
        "00:00".to_string(),                      // 37: event time
        "Y".to_string(),                          // 38: error-free connect
        "N".to_string(),                          // 39: ANSI-NG flag
        "Y".to_string(),                          // 40: record locking
        "14".to_string(),                         // 41: default color
        "0".to_string(),                          // 42: time credits
        ctx.last_call_date.clone(),               // 43: last new-file scan
        ctx.call_time.clone(),                    // 44: time of this call
        ctx.call_time.clone(),                    // 45: time of last call
        "999".to_string(),                        // 46: max daily files
        "0".to_string(),                          // 47: files downloaded today
        "0".to_string(),                          // 48: total KB uploaded
        "0".to_string(),                          // 49: total KB downloaded
        "None".to_string(),                       // 50: user comment
        "0".to_string(),                          // 51: total doors opened
        "0".to_string(),                          // 52: total messages left
    ];

    let mut out = String::new();
    for line in &lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// The 13-line RBBS `DORINFO1.DEF` layout.
///
/// Name fields are split on the first space and uppercased, as the format
/// expects.
fn render_dorinfo(ctx: &DropFileContext) -> String {
    let (sysop_first, sysop_last) = split_name(&ctx.sysop_name);
    let (user_first, user_last) = split_name(&ctx.user.real_name);
    let emulation = if ctx.ansi { "1" } else { "0" };

    let lines: [String; 13] = [
        ctx.bbs_name.clone(),                       // 1: system name
        sysop_first,                                // 2: sysop first name
        sysop_last,                                 // 3: sysop last name
        ctx.port_name.clone(),                      // 4: comm port
        format!("{} BAUD,N,8,1", ctx.baud),         // 5: line parameters
        "0".to_string(),                            // 6: network type
        user_first,                                 // 7: user first name
        user_last,                                  // 8: user last name
        ctx.user.location.clone(),                  // 9: location
        emulation.to_string(),                      // 10: terminal emulation
        ctx.user.security_level.to_string(),        // 11: security level
        ctx.user.time_remaining.to_string(),        // 12: minutes remaining
        "-1".to_string(),                           // 13: FOSSIL flag
    ];

    let mut out = String::new();
    for line in &lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// Split "First Rest Of Name" into uppercased (first, rest)
fn split_name(name: &str) -> (String, String) {
    match name.trim().split_once(' ') {
        Some((first, rest)) => (first.to_uppercase(), rest.trim().to_uppercase()),
        None => (name.trim().to_uppercase(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The fixed sample profile the golden fixtures are built from
    fn sample_context() -> DropFileContext {
        DropFileContext {
            bbs_name: "Doorway BBS".to_string(),
            sysop_name: "Ada Lovelace".to_string(),
            user: UserProfile {
                handle: "CYBER".to_string(),
                real_name: "Chris Masters".to_string(),
                location: "Helsinki, Finland".to_string(),
                security_level: 50,
                time_remaining: 59,
            },
            node: 1,
            port_name: "COM1".to_string(),
            baud: 38_400,
            ansi: true,
            rows: 24,
            total_calls: 12,
            last_call_date: "08/01/26".to_string(),
            call_time: "20:15".to_string(),
        }
    }

    #[test]
    fn test_door_sys_golden() {
        let expected = "COM1:\r\n38400\r\n8\r\n1\r\n38400\r\nY\r\nN\r\nN\r\nN\r\n\
                        Chris Masters\r\nHelsinki, Finland\r\n555-555-5555\r\n555-555-5555\r\n\
                        SECRET\r\n50\r\n12\r\n08/01/26\r\n3540\r\n59\r\nGR\r\n24\r\nN\r\n\
                        0\r\n0\r\n12/31/99\r\n1\r\nZ\r\n0\r\n0\r\n0\r\n999999\r\n01/01/80\r\n\
                        C:\\DOORWAY\r\nC:\\DOORWAY\r\nAda Lovelace\r\nCYBER\r\n00:00\r\nY\r\n\
                        N\r\nY\r\n14\r\n0\r\n08/01/26\r\n20:15\r\n20:15\r\n999\r\n0\r\n0\r\n\
                        0\r\nNone\r\n0\r\n0\r\n";

        let rendered = render(DropFileKind::DoorSys, &sample_context());
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_dorinfo_golden() {
        let expected = "Doorway BBS\r\nADA\r\nLOVELACE\r\nCOM1\r\n38400 BAUD,N,8,1\r\n0\r\n\
                        CHRIS\r\nMASTERS\r\nHelsinki, Finland\r\n1\r\n50\r\n59\r\n-1\r\n";

        let rendered = render(DropFileKind::DorInfo, &sample_context());
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_door_sys_line_count_and_endings() {
        let rendered = render(DropFileKind::DoorSys, &sample_context());
        assert!(rendered.ends_with("\r\n"));
        assert_eq!(rendered.matches("\r\n").count(), 52);
        // No bare LF anywhere
        assert_eq!(rendered.matches('\n').count(), 52);
    }

    #[test]
    fn test_dorinfo_reflects_monochrome_terminal() {
        let mut ctx = sample_context();
        ctx.ansi = false;
        let rendered = render(DropFileKind::DorInfo, &ctx);
        let lines: Vec<&str> = rendered.split("\r\n").collect();
        assert_eq!(lines[9], "0");
    }

    #[test]
    fn test_write_drop_file_uses_expected_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_drop_file(dir.path(), DropFileKind::DorInfo, &sample_context()).unwrap();
        assert_eq!(path.file_name().unwrap(), "DORINFO1.DEF");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Doorway BBS\r\n"));
    }

    #[test]
    fn test_single_word_name_split() {
        let (first, last) = split_name("Sysop");
        assert_eq!(first, "SYSOP");
        assert_eq!(last, "");
    }
}
