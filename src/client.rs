//! Minimal downstream client peer: just enough option negotiation and
//! amp-grid bookkeeping to drive the terminal adapter end-to-end. What,
//! if anything, gets drawn into the grid is out of scope — this is a
//! stand-in for a peer the orchestrator can exercise in scenarios like
//! the NAWS handshake.

use crate::amp::{Grid, Palette};
use crate::clip::ByteClip;
use crate::telnet::{self, telnet::*, Negotiator};

pub struct Client {
    negotiator: Negotiator,
    pub screen: Grid,
    pub palette: Palette,
    pub shutdown: bool,
    pub incoming: ByteClip,
    pub outgoing: ByteClip,
}

impl Client {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_palette(width, height, Palette::TrueColor)
    }

    pub fn with_palette(width: usize, height: usize, palette: Palette) -> Self {
        let mut negotiator = Negotiator::new();
        negotiator.want_remote(OPT_NAWS);
        negotiator.want_local(OPT_ECHO);
        negotiator.want_local(OPT_SGA);
        negotiator.want_remote(OPT_SGA);
        negotiator.want_local(OPT_BINARY);
        negotiator.want_remote(OPT_BINARY);
        Client {
            negotiator,
            screen: Grid::new(width, height),
            palette,
            shutdown: false,
            incoming: ByteClip::new(),
            outgoing: ByteClip::new(),
        }
    }

    /// Serializes the full grid through this client's configured palette.
    pub fn render(&self) -> String {
        self.screen.to_ansi(self.palette)
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Cooperative shutdown: park the cursor before the orchestrator
    /// stops accepting new outbound writes from this peer.
    pub fn shutdown(&mut self) {
        if self.shutdown {
            return;
        }
        self.outgoing.append(b"\x1b[9999;1H");
        self.shutdown = true;
    }

    /// One update pass: drain `incoming`, respond to IAC commands via the
    /// Q-method negotiator, emit any pending initiations. Returns `true`
    /// if any bytes were produced or consumed.
    pub fn update(&mut self) -> bool {
        if self.shutdown {
            return false;
        }
        let mut moved = false;
        loop {
            let buf = self.incoming.as_slice();
            if buf.is_empty() {
                break;
            }
            if buf[0] == IAC {
                let len = telnet::iac_sequence_length(buf);
                if len == 0 {
                    break; // incomplete
                }
                if len == 3 && matches!(buf[1], DO | DONT | WILL | WONT) {
                    if let Some(reply) = self.negotiator.handle_inbound(buf[1], buf[2]) {
                        self.outgoing.append(&telnet::encode_cmd(reply));
                    }
                }
                let mut taken = self.incoming.shift(len);
                taken.clear();
                moved = true;
            } else {
                let len = telnet::nonblocking_length(buf).max(1);
                self.incoming.shift(len); // text runs are consumed; drawing is out of scope
                moved = true;
            }
        }
        for cmd in self.negotiator.pending_initiations() {
            self.outgoing.append(&telnet::encode_cmd(cmd));
            moved = true;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wants_naws_remote_and_emits_do_on_creation_is_not_automatic() {
        let client = Client::new(80, 24);
        assert!(client.negotiator().state(OPT_NAWS).remote.wanted);
    }

    #[test]
    fn update_emits_pending_initiations() {
        let mut client = Client::new(80, 24);
        let moved = client.update();
        assert!(moved);
        assert!(!client.outgoing.is_empty());
    }

    #[test]
    fn shutdown_emits_cursor_park_once() {
        let mut client = Client::new(80, 24);
        client.shutdown();
        client.shutdown();
        assert_eq!(
            client.outgoing.as_slice().iter().filter(|&&b| b == 0x1B).count(),
            1
        );
    }

    #[test]
    fn with_palette_is_used_by_render() {
        let client = Client::with_palette(4, 1, crate::amp::Palette::Classic16);
        assert_eq!(client.palette, crate::amp::Palette::Classic16);
        let _ = client.render();
    }

    #[test]
    fn shutdown_stops_processing_incoming() {
        let mut client = Client::new(80, 24);
        client.shutdown();
        client.outgoing.clear();
        client.incoming.append(b"hello");
        assert!(!client.update());
    }
}
