//! Byte router between the global in/out clips and the terminal/client
//! peers. Owns no state beyond a transient append-then-clear relay: a
//! clip is never read by two owners at once.

use crate::clip::ByteClip;

#[derive(Default)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher
    }

    /// Route `global_in` to whichever side is primary (terminal, if
    /// present, else client), clearing the source after the copy. Per the
    /// open question in the design notes, exactly one side is primary at
    /// a time; this routes to the terminal side unconditionally since
    /// this crate wires exactly one terminal adapter.
    pub fn route_inbound(&mut self, global_in: &mut ByteClip, terminal_in: &mut ByteClip) -> bool {
        if global_in.is_empty() {
            return false;
        }
        terminal_in.append_clip(global_in);
        global_in.clear();
        true
    }

    /// Drain a peer's outbound-to-dispatcher clip into `global_out`,
    /// clearing the source.
    pub fn drain_outbound(&mut self, peer_out: &mut ByteClip, global_out: &mut ByteClip) -> bool {
        if peer_out.is_empty() {
            return false;
        }
        global_out.append_clip(peer_out);
        peer_out.clear();
        true
    }

    /// Relay bytes produced by the terminal adapter for the client peer,
    /// and vice versa, clearing each source after the copy.
    pub fn relay_terminal_client(
        &mut self,
        terminal_to_client: &mut ByteClip,
        client_in: &mut ByteClip,
        client_to_terminal: &mut ByteClip,
        terminal_in: &mut ByteClip,
    ) -> bool {
        let mut moved = false;
        if !terminal_to_client.is_empty() {
            client_in.append_clip(terminal_to_client);
            terminal_to_client.clear();
            moved = true;
        }
        if !client_to_terminal.is_empty() {
            terminal_in.append_clip(client_to_terminal);
            client_to_terminal.clear();
            moved = true;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_inbound_clears_source() {
        let mut d = Dispatcher::new();
        let mut global_in: ByteClip = ByteClip::new();
        let mut terminal_in: ByteClip = ByteClip::new();
        global_in.append(b"abc");
        assert!(d.route_inbound(&mut global_in, &mut terminal_in));
        assert_eq!(terminal_in.as_slice(), b"abc");
        assert!(global_in.is_empty());
    }

    #[test]
    fn drain_outbound_is_noop_when_empty() {
        let mut d = Dispatcher::new();
        let mut peer_out: ByteClip = ByteClip::new();
        let mut global_out: ByteClip = ByteClip::new();
        assert!(!d.drain_outbound(&mut peer_out, &mut global_out));
    }

    #[test]
    fn relay_moves_both_directions() {
        let mut d = Dispatcher::new();
        let mut t2c: ByteClip = ByteClip::new();
        let mut c_in: ByteClip = ByteClip::new();
        let mut c2t: ByteClip = ByteClip::new();
        let mut t_in: ByteClip = ByteClip::new();
        t2c.append(b"from-terminal");
        c2t.append(b"from-client");
        assert!(d.relay_terminal_client(&mut t2c, &mut c_in, &mut c2t, &mut t_in));
        assert_eq!(c_in.as_slice(), b"from-terminal");
        assert_eq!(t_in.as_slice(), b"from-client");
        assert!(t2c.is_empty());
        assert!(c2t.is_empty());
    }
}
