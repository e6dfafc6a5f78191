use std::process::ExitCode;

use wireterm::amp::Palette;
use wireterm::client::Client;
use wireterm::session::Orchestrator;
use wireterm::terminal::TerminalAdapter;
use wireterm::tty::Tty;

fn palette_from_env() -> Palette {
    match std::env::var("WIRETERM_PALETTE").as_deref() {
        Ok("16") => Palette::Classic16,
        _ => Palette::TrueColor,
    }
}

const DEFAULT_READ_BUF_SIZE: usize = 4096;

fn read_buf_size_from_env() -> usize {
    std::env::var("WIRETERM_BUFSIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_READ_BUF_SIZE)
}

fn main() -> ExitCode {
    if let Err(e) = wireterm::signals::install_all() {
        eprintln!("failed to install signal handlers: {e}");
        return ExitCode::from(1);
    }

    let palette = palette_from_env();
    let read_buf_size = read_buf_size_from_env();

    let tty = match Tty::new() {
        Ok(tty) => tty,
        Err(e) => {
            eprintln!("failed to open controlling terminal: {e}");
            return ExitCode::from(1);
        }
    };

    let terminal = TerminalAdapter::new(tty);
    let client = Client::with_palette(80, 24, palette);
    let mut orchestrator = Orchestrator::with_read_buf_size(terminal, client, read_buf_size);

    match orchestrator.run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("abnormal termination: {e}");
            ExitCode::from(1)
        }
    }
}
