//! Session orchestrator: the single-threaded cooperative tick loop tying
//! the clip, telnet, terminal, and amp components together.

use std::io::{self, Read, Write};

use crate::clip::ByteClip;
use crate::client::Client;
use crate::dispatcher::Dispatcher;
use crate::signals::{self, SignalKind};
use crate::terminal::TerminalAdapter;

const DEFAULT_READ_BUF_SIZE: usize = 4096;

pub struct SessionStats {
    pub boot_time: chrono::DateTime<chrono::Utc>,
    pub last_tick_time: chrono::DateTime<chrono::Utc>,
    pub tick_count: u64,
}

impl SessionStats {
    fn new() -> Self {
        let now = chrono::Utc::now();
        SessionStats {
            boot_time: now,
            last_tick_time: now,
            tick_count: 0,
        }
    }

    fn record_tick(&mut self) {
        self.tick_count += 1;
        self.last_tick_time = chrono::Utc::now();
    }
}

pub struct Orchestrator {
    terminal: TerminalAdapter,
    client: Client,
    dispatcher: Dispatcher,
    global_in: ByteClip,
    global_out: ByteClip,
    shutdown: bool,
    stats: SessionStats,
    read_buf_size: usize,
}

impl Orchestrator {
    pub fn new(terminal: TerminalAdapter, client: Client) -> Self {
        Self::with_read_buf_size(terminal, client, DEFAULT_READ_BUF_SIZE)
    }

    pub fn with_read_buf_size(terminal: TerminalAdapter, client: Client, read_buf_size: usize) -> Self {
        Orchestrator {
            terminal,
            client,
            dispatcher: Dispatcher::new(),
            global_in: ByteClip::new(),
            global_out: ByteClip::new(),
            shutdown: false,
            stats: SessionStats::new(),
            read_buf_size: read_buf_size.max(1),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Feed bytes that arrived on the upstream input this tick.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        self.global_in.append(bytes);
    }

    /// Take bytes ready to be written to the upstream output.
    pub fn take_output(&mut self) -> Vec<u8> {
        let out = self.global_out.as_slice().to_vec();
        self.global_out.clear();
        out
    }

    fn drain_signals(&mut self) {
        while let Some(sig) = signals::next() {
            match sig {
                SignalKind::Interrupt | SignalKind::Terminate | SignalKind::Quit => {
                    self.shutdown = true;
                }
                SignalKind::WindowChange => {
                    self.terminal.flags.reformat = true;
                }
                SignalKind::Alarm | SignalKind::Pipe => {
                    // latch-only: already cleared by signals::next()
                }
            }
        }
    }

    /// Runs one full tick: drain signals, route bytes, update every
    /// component in order, flush outbound. Returns `true` if any bytes
    /// moved anywhere in the pipeline.
    pub fn tick(&mut self) -> bool {
        self.stats.record_tick();
        self.drain_signals();

        let mut moved = self
            .dispatcher
            .route_inbound(&mut self.global_in, &mut self.terminal.interface_in);

        if self.shutdown && !self.client.shutdown {
            self.client.shutdown();
            self.terminal.interface_out.append(b"\x1b[H");
            moved = true;
        }

        moved |= self.client.update();
        moved |= self.terminal.update();

        moved |= self.dispatcher.relay_terminal_client(
            &mut self.terminal.client_out,
            &mut self.client.incoming,
            &mut self.client.outgoing,
            &mut self.terminal.client_in,
        );

        moved |= self
            .dispatcher
            .drain_outbound(&mut self.terminal.interface_out, &mut self.global_out);

        moved
    }

    /// Runs the orchestrator against real stdin/stdout until shutdown and
    /// EOF, or EOF with no shutdown signal. Returns the process exit code.
    pub fn run(&mut self) -> io::Result<i32> {
        self.terminal.init()?;
        let mut stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buf = vec![0u8; self.read_buf_size];
        let mut eof = false;

        loop {
            let moved = self.tick();

            let out = self.take_output();
            if !out.is_empty() {
                if let Err(e) = stdout.write_all(&out) {
                    if e.kind() != io::ErrorKind::WouldBlock && e.kind() != io::ErrorKind::Interrupted {
                        self.terminal.flags.broken = true;
                    }
                }
                let _ = stdout.flush();
            }

            if (self.shutdown || eof) && !moved {
                break;
            }

            if !moved {
                match stdin.read(&mut buf) {
                    Ok(0) => eof = true,
                    Ok(n) => self.feed_input(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {}
                    Err(_) => {
                        self.terminal.flags.broken = true;
                        eof = true;
                    }
                }
            }

            if self.terminal.flags.broken {
                break;
            }
        }

        self.terminal.deinit()?;
        crate::diag::drain_to_stderr();

        if self.terminal.flags.broken {
            eprintln!("abnormal termination");
            Ok(1)
        } else {
            eprintln!("normal termination");
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::telnet::*;

    #[test]
    fn one_tick_with_no_input_does_not_panic() {
        let terminal = TerminalAdapter::for_test();
        let client = Client::new(80, 24);
        let mut orch = Orchestrator::new(terminal, client);
        orch.tick();
    }

    #[test]
    fn with_read_buf_size_clamps_zero_to_one() {
        let terminal = TerminalAdapter::for_test();
        let client = Client::new(80, 24);
        let orch = Orchestrator::with_read_buf_size(terminal, client, 0);
        assert_eq!(orch.read_buf_size, 1);
    }

    #[test]
    fn shutdown_signal_sets_shutdown_flag() {
        let terminal = TerminalAdapter::for_test();
        let client = Client::new(80, 24);
        let mut orch = Orchestrator::new(terminal, client);
        orch.shutdown = true;
        orch.tick();
        assert!(orch.is_shutdown());
    }

    #[test]
    fn feed_input_is_routed_to_terminal_interface() {
        let terminal = TerminalAdapter::for_test();
        let client = Client::new(80, 24);
        let mut orch = Orchestrator::new(terminal, client);
        orch.feed_input(b"hello");
        let moved = orch.tick();
        assert!(moved);
    }

    #[test]
    fn naws_do_from_client_round_trips_to_output() {
        let terminal = TerminalAdapter::for_test();
        let client = Client::new(80, 24);
        let mut orch = Orchestrator::new(terminal, client);
        orch.terminal.width = 100;
        orch.terminal.height = 40;
        orch.terminal.client_in.append(&[IAC, DO, OPT_NAWS]);
        orch.tick();
        orch.tick();
        let out = orch.take_output();
        assert!(!out.is_empty());
    }
}
