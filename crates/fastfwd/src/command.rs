//! The `fastforward` console command.

use std::sync::Arc;

use tracing::debug;

use crate::timeskip::PendingSkip;

/// Where command output goes. The engine routes this to its own console;
/// tests capture it.
pub trait Console {
    fn print(&self, msg: &str);
    fn warn(&self, msg: &str);
}

/// C `atof` semantics: parse the longest numeric prefix, anything that
/// yields no prefix at all is 0.0. Console users expect "fastforward 3x"
/// to skip 3 seconds, not to error.
pub fn parse_seconds(arg: &str) -> f32 {
    let s = arg.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0usize;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let mut saw_digit = false;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
        saw_digit = true;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
            saw_digit = true;
        }
    }
    if !saw_digit {
        return 0.0;
    }
    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            while bytes.get(exp).is_some_and(u8::is_ascii_digit) {
                exp += 1;
            }
            end = exp;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

/// Arms the pending skip from console arguments.
pub struct FastForwardCommand {
    pending: Arc<PendingSkip>,
}

impl FastForwardCommand {
    pub fn new(pending: Arc<PendingSkip>) -> Self {
        FastForwardCommand { pending }
    }

    /// `args` is argv-style: `args[0]` is the command name itself.
    pub fn run(&self, args: &[&str], console: &impl Console) {
        if args.len() != 2 {
            console.warn("usage: fastforward <time>");
            return;
        }
        let seconds = parse_seconds(args[1]);
        self.pending.arm(seconds);
        debug!("armed skip of {seconds} seconds");
        console.print(&format!("fast-forwarding {seconds} seconds"));
    }
}
