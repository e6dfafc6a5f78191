//! Terminal adapter: raw-mode lifecycle, CSI DSR geometry probe, ESC
//! classification, and the IAC/ESC/TXT split between the upstream
//! interface (stdin/stdout) and the downstream client peer.

use crate::clip::ByteClip;
use crate::telnet::{self, telnet::*, Negotiator};
use crate::tty::Tty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    None,
    InitEditor,
    AskScreenSize,
    GetScreenSize,
    Idle,
}

/// Offset of the first ESC (0x1B) in `buf`, or the full length if none is
/// present.
pub fn esc_nonblocking_length(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b == 0x1B).unwrap_or(buf.len())
}

/// Length of the leading ESC sequence starting at `buf[0] == 0x1B`.
/// Recognizes, in order: the DSR cursor-position reply `ESC[rows;colsR`,
/// the arrow/home/end atomic keys `ESC[A..FH`, and `~`-terminated keys
/// `ESC[<digits>~`. Returns 0 if incomplete (need more bytes), 1 if the
/// sequence is recognized as CSI-shaped but doesn't match any known
/// terminator (skip one byte and resynchronize).
pub fn esc_blocking_length(buf: &[u8]) -> usize {
    if buf.is_empty() || buf[0] != 0x1B {
        return 0;
    }
    if buf.len() < 2 {
        return 0;
    }
    if buf[1] != b'[' {
        return match buf[1] {
            b'7' | b'8' | b'=' | b'>' => 2,
            _ => 1,
        };
    }
    let mut i = 2;
    while i < buf.len() && (buf[i].is_ascii_digit() || buf[i] == b';') {
        i += 1;
    }
    if i >= buf.len() {
        return 0; // incomplete: no terminator seen yet
    }
    let digits_present = i > 2;
    match buf[i] {
        b'R' if digits_present => i + 1,
        b'A' | b'B' | b'C' | b'D' | b'E' | b'F' | b'H' if !digits_present => i + 1,
        b'~' if digits_present => i + 1,
        _ => 1,
    }
}

/// Parses a DSR cursor-position reply `ESC[rows;colsR` (the whole
/// sequence, as returned by [`esc_blocking_length`]). Returns `(rows,
/// cols)` on success.
pub fn parse_dsr_reply(buf: &[u8]) -> Option<(u16, u16)> {
    if buf.len() < 2 || buf[0] != 0x1B || buf[1] != b'[' || *buf.last()? != b'R' {
        return None;
    }
    let body = std::str::from_utf8(&buf[2..buf.len() - 1]).ok()?;
    let (rows, cols) = body.split_once(';')?;
    Some((rows.parse().ok()?, cols.parse().ok()?))
}

pub struct Flags {
    pub raw: bool,
    pub broken: bool,
    pub shutdown: bool,
    pub reformat: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            raw: false,
            broken: false,
            shutdown: false,
            reformat: false,
        }
    }
}

/// The terminal adapter: owns the physical TTY and the upstream
/// interface's IAC/ESC/TXT framing, and bridges it with a downstream
/// client peer via the four clips named in the spec.
pub struct TerminalAdapter {
    tty: Tty,
    state: State,
    pub width: u16,
    pub height: u16,
    last_sent_width: u16,
    last_sent_height: u16,
    cursor_x: u16,
    cursor_y: u16,
    pub flags: Flags,
    negotiator: Negotiator,
    pub interface_in: ByteClip,
    pub interface_out: ByteClip,
    pub client_in: ByteClip,
    pub client_out: ByteClip,
}

impl TerminalAdapter {
    /// Builds an adapter without a real tty, for tests that only need to
    /// exercise the framing and state-machine logic against the clips.
    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        TerminalAdapter {
            tty: unsafe { std::mem::zeroed() },
            state: State::None,
            width: 0,
            height: 0,
            last_sent_width: 0,
            last_sent_height: 0,
            cursor_x: 0,
            cursor_y: 0,
            flags: Flags::default(),
            negotiator: {
                let mut n = Negotiator::new();
                n.want_local(OPT_NAWS);
                n
            },
            interface_in: ByteClip::new(),
            interface_out: ByteClip::new(),
            client_in: ByteClip::new(),
            client_out: ByteClip::new(),
        }
    }

    pub fn new(tty: Tty) -> Self {
        let mut negotiator = Negotiator::new();
        negotiator.want_local(OPT_NAWS);
        TerminalAdapter {
            tty,
            state: State::None,
            width: 0,
            height: 0,
            last_sent_width: 0,
            last_sent_height: 0,
            cursor_x: 0,
            cursor_y: 0,
            flags: Flags::default(),
            negotiator,
            interface_in: ByteClip::new(),
            interface_out: ByteClip::new(),
            client_in: ByteClip::new(),
            client_out: ByteClip::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Enter raw mode and start the INIT-EDITOR -> ASK-SCREEN-SIZE ->
    /// (GET-SCREEN-SIZE) -> IDLE transition sequence.
    pub fn init(&mut self) -> std::io::Result<()> {
        self.tty.enable_raw()?;
        self.flags.raw = true;
        self.state = State::InitEditor;
        Ok(())
    }

    pub fn deinit(&mut self) -> std::io::Result<()> {
        self.tty.disable_raw()?;
        self.flags.raw = false;
        Ok(())
    }

    fn fast_geometry_probe(&mut self) -> bool {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if rc == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
            self.width = ws.ws_col;
            self.height = ws.ws_row;
            true
        } else {
            false
        }
    }

    /// Advance the state machine by (at most) one transition. Returns
    /// `true` if a transition happened (caller should call again to let
    /// the machine settle).
    fn advance_state(&mut self) -> bool {
        match self.state {
            State::InitEditor => {
                self.cursor_x = 0;
                self.cursor_y = 0;
                self.state = State::AskScreenSize;
                true
            }
            State::AskScreenSize => {
                if self.fast_geometry_probe() {
                    self.state = State::Idle;
                } else {
                    self.interface_out
                        .append(b"\x1b7\x1b[999C\x1b[999B\x1b[6n\x1b8");
                    self.state = State::GetScreenSize;
                }
                true
            }
            State::GetScreenSize => false, // suspended until a DSR reply arrives
            State::Idle => {
                if self.flags.reformat {
                    self.state = State::AskScreenSize;
                    true
                } else {
                    false
                }
            }
            State::None => false,
        }
    }

    /// Consume one classified IAC/ESC/TXT run from `self.interface_in`.
    /// Returns `true` if any bytes were consumed.
    fn process_interface_in(&mut self) -> bool {
        let buf = self.interface_in.as_slice();
        if buf.is_empty() {
            return false;
        }
        if buf[0] == IAC {
            let len = telnet::iac_sequence_length(buf);
            if len == 0 {
                return false; // incomplete, wait for more
            }
            self.handle_interface_iac(&buf[..len].to_vec());
            let mut taken = self.interface_in.shift(len);
            taken.clear();
            true
        } else if buf[0] == 0x1B {
            let len = esc_blocking_length(buf);
            if len == 0 {
                return false; // incomplete
            }
            let frame = buf[..len].to_vec();
            self.handle_interface_esc(&frame);
            let mut taken = self.interface_in.shift(len);
            taken.clear();
            true
        } else {
            let len = telnet::nonblocking_length(buf)
                .min(esc_nonblocking_length(buf))
                .min(buf.len())
                .max(1);
            let taken = self.interface_in.shift(len);
            self.client_out.append_clip(&taken);
            true
        }
    }

    fn handle_interface_iac(&mut self, frame: &[u8]) {
        if frame.len() == 3 && matches!(frame[1], DO | DONT | WILL | WONT) {
            if let Some(reply) = self.negotiator.handle_inbound(frame[1], frame[2]) {
                self.interface_out.append(&telnet::encode_cmd(reply));
            }
        }
        // Subnegotiations besides NAWS are not interpreted by this adapter.
    }

    fn handle_interface_esc(&mut self, frame: &[u8]) {
        if self.state == State::GetScreenSize {
            if let Some((rows, cols)) = parse_dsr_reply(frame) {
                self.width = cols;
                self.height = rows;
                self.flags.reformat = false;
                self.state = State::Idle;
                return;
            }
            self.flags.broken = true;
            return;
        }
        // Outside of the geometry probe, forward raw ESC frames downstream.
        self.client_out.append(frame);
    }

    /// Consume incoming bytes from the client peer: text runs go straight
    /// to the interface, `IAC DO NAWS` triggers an immediate WILL NAWS +
    /// subnegotiation reply.
    fn process_client_in(&mut self) -> bool {
        let buf = self.client_in.as_slice();
        if buf.is_empty() {
            return false;
        }
        if buf[0] == IAC {
            let len = telnet::iac_sequence_length(buf);
            if len == 0 {
                return false;
            }
            let frame = buf[..len].to_vec();
            if frame.len() == 3 && frame[1] == DO && frame[2] == OPT_NAWS {
                self.interface_out.append(&[IAC, WILL, OPT_NAWS]);
                self.interface_out
                    .append(&telnet::serialize_naws(self.width, self.height));
                self.last_sent_width = self.width;
                self.last_sent_height = self.height;
            }
            let mut taken = self.client_in.shift(len);
            taken.clear();
            true
        } else {
            let len = telnet::nonblocking_length(buf).min(buf.len()).max(1);
            let taken = self.client_in.shift(len);
            self.interface_out.append_clip(&taken);
            true
        }
    }

    /// Emit any pending option negotiation and a NAWS subnegotiation if
    /// geometry changed since the last one sent.
    fn emit_negotiation(&mut self) -> bool {
        let mut moved = false;
        for cmd in self.negotiator.pending_initiations() {
            self.interface_out.append(&telnet::encode_cmd(cmd));
            moved = true;
        }
        let naws_state = self.negotiator.state(OPT_NAWS);
        if naws_state.local.enabled
            && (self.width != self.last_sent_width || self.height != self.last_sent_height)
            && self.width > 0
            && self.height > 0
        {
            self.interface_out
                .append(&telnet::serialize_naws(self.width, self.height));
            self.last_sent_width = self.width;
            self.last_sent_height = self.height;
            moved = true;
        }
        moved
    }

    /// One update pass: drain inbound clips, advance the state machine,
    /// emit pending negotiation. Returns `true` if any bytes were
    /// produced or consumed (the orchestrator uses this to decide whether
    /// another tick's worth of work remains before blocking on I/O).
    pub fn update(&mut self) -> bool {
        let mut moved = false;
        while self.process_interface_in() {
            moved = true;
        }
        while self.process_client_in() {
            moved = true;
        }
        while self.advance_state() {
            moved = true;
        }
        if self.emit_negotiation() {
            moved = true;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn esc_nonblocking_stops_at_escape() {
        assert_eq!(esc_nonblocking_length(b"hello\x1bworld"), 5);
        assert_eq!(esc_nonblocking_length(b"noescape"), 8);
    }

    #[test]
    fn esc_blocking_dsr_reply() {
        let buf = b"\x1b[24;80R";
        assert_eq!(esc_blocking_length(buf), buf.len());
        assert_eq!(parse_dsr_reply(buf), Some((24, 80)));
    }

    #[test]
    fn esc_blocking_incomplete_returns_zero() {
        assert_eq!(esc_blocking_length(b"\x1b[24;8"), 0);
        assert_eq!(esc_blocking_length(b"\x1b["), 0);
        assert_eq!(esc_blocking_length(b"\x1b"), 0);
    }

    #[test]
    fn esc_blocking_atomic_arrow_key() {
        assert_eq!(esc_blocking_length(b"\x1b[A"), 3);
        assert_eq!(esc_blocking_length(b"\x1b[H"), 3);
    }

    #[test]
    fn esc_blocking_tilde_key() {
        assert_eq!(esc_blocking_length(b"\x1b[3~"), 4);
        assert_eq!(esc_blocking_length(b"\x1b[15~"), 5);
    }

    #[test]
    fn esc_blocking_invalid_skips_one_byte() {
        assert_eq!(esc_blocking_length(b"\x1b[Z"), 1);
    }

    fn adapter_without_real_tty() -> TerminalAdapter {
        let mut t = TerminalAdapter::for_test();
        t.state = State::GetScreenSize;
        t
    }

    #[test]
    fn s1_geometry_probe_fallback_via_dsr() {
        let mut t = adapter_without_real_tty();
        t.interface_in.append(b"\x1b[24;80R");
        t.update();
        assert_eq!(t.state(), State::Idle);
        assert_eq!(t.width, 80);
        assert_eq!(t.height, 24);
        // The only outbound bytes this tick are the spontaneous WILL NAWS
        // negotiation `for_test()` wants local; the DSR reply itself is
        // never echoed back.
        assert_eq!(t.interface_out.as_slice(), &[IAC, WILL, OPT_NAWS]);
    }

    #[test]
    fn client_do_naws_triggers_will_and_subneg() {
        let mut t = adapter_without_real_tty();
        t.width = 120;
        t.height = 40;
        t.state = State::Idle;
        t.client_in.append(&[IAC, DO, OPT_NAWS]);
        t.update();
        let out = t.interface_out.as_slice();
        assert!(out.starts_with(&[IAC, WILL, OPT_NAWS]));
        assert_eq!(&out[3..], &telnet::serialize_naws(120, 40)[..]);
    }

    #[test]
    fn plain_text_forwarded_downstream() {
        let mut t = adapter_without_real_tty();
        t.state = State::Idle;
        t.interface_in.append(b"hello");
        t.update();
        assert_eq!(t.client_out.as_slice(), b"hello");
    }
}
