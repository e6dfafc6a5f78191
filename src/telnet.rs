//! TELNET option negotiator: IAC framing, Q-method option state, and NAWS
//! (window size) subnegotiation (de)serialization.

pub mod telnet {
    pub const IAC: u8 = 255;
    pub const DONT: u8 = 254;
    pub const DO: u8 = 253;
    pub const WONT: u8 = 252;
    pub const WILL: u8 = 251;
    pub const SB: u8 = 250;
    pub const GA: u8 = 249;
    pub const EL: u8 = 248;
    pub const EC: u8 = 247;
    pub const AYT: u8 = 246;
    pub const AO: u8 = 245;
    pub const IP: u8 = 244;
    pub const BREAK: u8 = 243;
    pub const DM: u8 = 242;
    pub const NOP: u8 = 241;
    pub const SE: u8 = 240;
    pub const EOR: u8 = 239;

    pub const OPT_BINARY: u8 = 0;
    pub const OPT_ECHO: u8 = 1;
    pub const OPT_SGA: u8 = 3;
    pub const OPT_TELOPT_EOR: u8 = 25;
    pub const OPT_NAWS: u8 = 31;
}

use telnet::*;

/// Length of the leading text run (bytes before the first IAC). Zero if
/// the buffer begins with IAC.
pub fn nonblocking_length(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b == IAC).unwrap_or(buf.len())
}

/// Length of the leading IAC command. Zero if `buf` does not start with
/// IAC, or if the command is present but incomplete (caller should wait
/// for more bytes). Subnegotiation payloads tolerate a bare IAC not
/// followed by SE or IAC: it is skipped as a single malformed byte rather
/// than aborting the scan (RFC 855 loose-peer behavior).
pub fn iac_sequence_length(buf: &[u8]) -> usize {
    if buf.is_empty() || buf[0] != IAC {
        return 0;
    }
    if buf.len() < 2 {
        return 0;
    }
    match buf[1] {
        IAC => 2,
        DO | DONT | WILL | WONT => {
            if buf.len() < 3 {
                0
            } else {
                3
            }
        }
        SB => {
            // IAC SB <opt> ...payload... IAC SE
            let mut i = 2;
            loop {
                if i >= buf.len() {
                    return 0; // incomplete
                }
                if buf[i] == IAC {
                    if i + 1 >= buf.len() {
                        return 0; // incomplete
                    }
                    match buf[i + 1] {
                        SE => return i + 2,
                        IAC => i += 2, // quoted literal 0xFF
                        _ => i += 1,   // malformed: skip the lone IAC
                    }
                } else {
                    i += 1;
                }
            }
        }
        GA | EOR | EL | EC | AYT | AO | IP | BREAK | DM | NOP => 2,
        _ => 2,
    }
}

/// Serialize a NAWS subnegotiation for the given geometry, doubling any
/// embedded 0xFF byte per TELNET quoting rules.
pub fn serialize_naws(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![IAC, SB, OPT_NAWS];
    for byte in [
        (width >> 8) as u8,
        (width & 0xFF) as u8,
        (height >> 8) as u8,
        (height & 0xFF) as u8,
    ] {
        out.push(byte);
        if byte == IAC {
            out.push(IAC);
        }
    }
    out.push(IAC);
    out.push(SE);
    out
}

/// Deserialize a NAWS payload (the bytes strictly between `IAC SB NAWS`
/// and `IAC SE`, i.e. `buf` starts right after the option byte and does
/// not include the trailing `IAC SE`), un-quoting doubled 0xFF bytes.
/// Returns `None` if fewer than four logical bytes are present.
pub fn deserialize_naws(buf: &[u8]) -> Option<(u16, u16)> {
    let mut unquoted = Vec::with_capacity(4);
    let mut i = 0;
    while i < buf.len() && unquoted.len() < 4 {
        let b = buf[i];
        unquoted.push(b);
        if b == IAC && buf.get(i + 1) == Some(&IAC) {
            i += 2;
        } else {
            i += 1;
        }
    }
    if unquoted.len() < 4 {
        return None;
    }
    let width = u16::from_be_bytes([unquoted[0], unquoted[1]]);
    let height = u16::from_be_bytes([unquoted[2], unquoted[3]]);
    Some((width, height))
}

/// Per-side Q-method state for one option, one direction (local=WILL/WONT
/// or remote=DO/DONT).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideState {
    pub wanted: bool,
    pub enabled: bool,
    pub pending: bool,
}

/// Full per-option state: our local side (do we WILL) and the peer's
/// remote side (do we ask them to DO).
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionState {
    pub code: u8,
    pub local: SideState,
    pub remote: SideState,
}

impl OptionState {
    pub fn new(code: u8) -> Self {
        Self {
            code,
            local: SideState::default(),
            remote: SideState::default(),
        }
    }
}

/// The outbound command a negotiator decided to emit, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundCmd {
    pub verb: u8,
    pub code: u8,
}

/// Q-method negotiator over a small fixed set of recognized options.
pub struct Negotiator {
    options: Vec<OptionState>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self { options: Vec::new() }
    }

    fn slot(&mut self, code: u8) -> &mut OptionState {
        if let Some(idx) = self.options.iter().position(|o| o.code == code) {
            return &mut self.options[idx];
        }
        self.options.push(OptionState::new(code));
        self.options.last_mut().unwrap()
    }

    pub fn state(&self, code: u8) -> OptionState {
        self.options
            .iter()
            .find(|o| o.code == code)
            .copied()
            .unwrap_or_else(|| OptionState::new(code))
    }

    /// Mark that we want the local side (WILL) of `code` enabled.
    pub fn want_local(&mut self, code: u8) {
        self.slot(code).local.wanted = true;
    }

    /// Mark that we want the remote side (DO) of `code` enabled.
    pub fn want_remote(&mut self, code: u8) {
        self.slot(code).remote.wanted = true;
    }

    /// Handle one inbound 3-byte command (`verb` ∈ {DO,DONT,WILL,WONT},
    /// `code` the option). Returns the outbound reply, if the Q-method
    /// calls for one.
    pub fn handle_inbound(&mut self, verb: u8, code: u8) -> Option<OutboundCmd> {
        let opt = self.slot(code);
        match verb {
            DO => {
                opt.local.pending = false;
                if !opt.local.enabled {
                    opt.local.enabled = true;
                    Some(OutboundCmd { verb: WILL, code })
                } else {
                    None
                }
            }
            DONT => {
                opt.local.pending = false;
                if opt.local.enabled {
                    opt.local.enabled = false;
                    Some(OutboundCmd { verb: WONT, code })
                } else {
                    None
                }
            }
            WILL => {
                opt.remote.pending = false;
                if !opt.remote.enabled {
                    opt.remote.enabled = true;
                    Some(OutboundCmd { verb: DO, code })
                } else {
                    None
                }
            }
            WONT => {
                opt.remote.pending = false;
                if opt.remote.enabled {
                    opt.remote.enabled = false;
                    Some(OutboundCmd { verb: DONT, code })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Emit WILL/DO for any option whose side is wanted but neither
    /// enabled nor already pending (spontaneous initiation).
    pub fn pending_initiations(&mut self) -> Vec<OutboundCmd> {
        let mut out = Vec::new();
        for opt in &mut self.options {
            if opt.local.wanted && !opt.local.enabled && !opt.local.pending {
                opt.local.pending = true;
                out.push(OutboundCmd {
                    verb: WILL,
                    code: opt.code,
                });
            }
            if opt.remote.wanted && !opt.remote.enabled && !opt.remote.pending {
                opt.remote.pending = true;
                out.push(OutboundCmd {
                    verb: DO,
                    code: opt.code,
                });
            }
        }
        out
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_cmd(cmd: OutboundCmd) -> [u8; 3] {
    [IAC, cmd.verb, cmd.code]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonblocking_length_stops_at_iac() {
        assert_eq!(nonblocking_length(b"hello"), 5);
        assert_eq!(nonblocking_length(&[b'a', b'b', IAC, b'c']), 2);
        assert_eq!(nonblocking_length(&[IAC, WILL, 1]), 0);
    }

    #[test]
    fn iac_sequence_length_three_byte_commands() {
        for verb in [DO, DONT, WILL, WONT] {
            assert_eq!(iac_sequence_length(&[IAC, verb, 31]), 3);
        }
    }

    #[test]
    fn iac_sequence_length_zero_on_non_iac() {
        assert_eq!(iac_sequence_length(b"abc"), 0);
    }

    #[test]
    fn iac_sequence_length_incomplete_returns_zero() {
        assert_eq!(iac_sequence_length(&[IAC]), 0);
        assert_eq!(iac_sequence_length(&[IAC, WILL]), 0);
        assert_eq!(iac_sequence_length(&[IAC, SB, OPT_NAWS]), 0);
    }

    #[test]
    fn iac_sequence_length_subnegotiation_with_quoted_iac() {
        // IAC SB NAWS <IAC IAC> IAC SE : one literal 0xFF (n=1), k=1
        let buf = [IAC, SB, OPT_NAWS, IAC, IAC, IAC, SE];
        assert_eq!(iac_sequence_length(&buf), 5 + 1 + 1);
    }

    #[test]
    fn iac_sequence_length_skips_malformed_iac_in_payload() {
        let buf = [IAC, SB, OPT_NAWS, IAC, 0x41, IAC, SE];
        assert_eq!(iac_sequence_length(&buf), 7);
    }

    #[test]
    fn naws_round_trip() {
        for (w, h) in [(80u16, 24u16), (255, 511), (0, 0), (65535, 65535)] {
            let bytes = serialize_naws(w, h);
            let header = &bytes[0..3];
            assert_eq!(header, &[IAC, SB, OPT_NAWS]);
            let payload = &bytes[3..bytes.len() - 2];
            assert_eq!(&bytes[bytes.len() - 2..], &[IAC, SE]);
            assert_eq!(deserialize_naws(payload), Some((w, h)));
        }
    }

    #[test]
    fn naws_serialize_doubles_0xff_bytes_s3() {
        let bytes = serialize_naws(255, 511);
        assert_eq!(bytes, vec![IAC, SB, OPT_NAWS, 0x00, 0xFF, 0xFF, 0x01, 0xFF, 0xFF, IAC, SE]);
        assert_eq!(bytes.len(), 11);
    }

    #[test]
    fn naws_serialized_length_matches_quoted_byte_count() {
        let (w, h) = (255u16, 511u16);
        let bytes = serialize_naws(w, h);
        let raw = [(w >> 8) as u8, (w & 0xFF) as u8, (h >> 8) as u8, (h & 0xFF) as u8];
        let k = raw.iter().filter(|&&b| b == IAC).count();
        assert_eq!(bytes.len(), 9 + k);
    }

    #[test]
    fn q_method_do_then_dont_emits_will_then_wont() {
        let mut neg = Negotiator::new();
        let r1 = neg.handle_inbound(DO, OPT_NAWS);
        assert_eq!(r1, Some(OutboundCmd { verb: WILL, code: OPT_NAWS }));
        assert!(neg.state(OPT_NAWS).local.enabled);
        let r2 = neg.handle_inbound(DONT, OPT_NAWS);
        assert_eq!(r2, Some(OutboundCmd { verb: WONT, code: OPT_NAWS }));
        assert!(!neg.state(OPT_NAWS).local.enabled);
    }

    #[test]
    fn do_while_already_enabled_sends_no_reply() {
        let mut neg = Negotiator::new();
        neg.handle_inbound(DO, OPT_ECHO);
        assert_eq!(neg.handle_inbound(DO, OPT_ECHO), None);
    }

    #[test]
    fn s2_naws_handshake_will_yields_do() {
        let mut neg = Negotiator::new();
        neg.want_remote(OPT_NAWS);
        let reply = neg.handle_inbound(WILL, OPT_NAWS);
        assert_eq!(reply, Some(OutboundCmd { verb: DO, code: OPT_NAWS }));
        assert!(neg.state(OPT_NAWS).remote.enabled);
    }

    #[test]
    fn pending_initiations_only_fire_once() {
        let mut neg = Negotiator::new();
        neg.want_local(OPT_SGA);
        let first = neg.pending_initiations();
        assert_eq!(first, vec![OutboundCmd { verb: WILL, code: OPT_SGA }]);
        let second = neg.pending_initiations();
        assert!(second.is_empty());
    }
}
