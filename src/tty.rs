#[cfg(unix)]
mod unix {
    use libc;
    use std::io::{self, Write};
    use std::mem;

    pub struct Tty {
        old: libc::termios,
        enabled: bool,
    }

    impl Tty {
        pub fn new() -> io::Result<Self> {
            unsafe {
                let mut old = mem::zeroed::<libc::termios>();
                if libc::tcgetattr(libc::STDIN_FILENO, &mut old) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(Self { old, enabled: false })
            }
        }

        pub fn enable_raw(&mut self) -> io::Result<()> {
            if self.enabled {
                return Ok(());
            }
            unsafe {
                let mut raw = self.old;
                raw.c_iflag &= !(libc::BRKINT
                    | libc::ICRNL
                    | libc::INPCK
                    | libc::ISTRIP
                    | libc::IXON) as libc::tcflag_t;
                raw.c_oflag &= !(libc::OPOST as libc::tcflag_t);
                raw.c_cflag |= libc::CS8 as libc::tcflag_t;
                raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG) as libc::tcflag_t;
                raw.c_cc[libc::VMIN] = 0;
                raw.c_cc[libc::VTIME] = 10;
                if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) != 0 {
                    return Err(io::Error::last_os_error());
                }
                self.enabled = true;
            }
            // Save cursor and switch to the alternate screen so the
            // session's redraws never touch the caller's own scrollback.
            let mut out = io::stdout();
            let _ = out.write_all(b"\x1b7\x1b[?47h");
            let _ = out.flush();
            crate::diag::set_raw_mode(true);
            Ok(())
        }

        pub fn disable_raw(&mut self) -> io::Result<()> {
            if !self.enabled {
                return Ok(());
            }
            let mut out = io::stdout();
            let _ = out.write_all(b"\x1b[?47l\x1b8");
            let _ = out.flush();
            unsafe {
                if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.old) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            self.enabled = false;
            crate::diag::set_raw_mode(false);
            Ok(())
        }

        pub fn is_raw(&self) -> bool {
            self.enabled
        }

        pub fn keypad_application_mode(&self, on: bool) -> io::Result<()> {
            let seq = if on { b"\x1b=" } else { b"\x1b>" };
            let mut out = io::stdout();
            out.write_all(seq)?;
            out.flush()?;
            Ok(())
        }
    }

    impl Drop for Tty {
        fn drop(&mut self) {
            let _ = self.disable_raw();
            let _ = self.keypad_application_mode(false);
        }
    }

    pub use Tty as PlatformTty;
}

#[cfg(not(unix))]
mod nonunix {
    use std::io;
    pub struct Tty;
    impl Tty { pub fn new() -> io::Result<Self> { Ok(Tty) } pub fn enable_raw(&mut self)->io::Result<()> { Ok(()) } pub fn disable_raw(&mut self)->io::Result<()> { Ok(()) } pub fn is_raw(&self)->bool { false } pub fn keypad_application_mode(&self,_:bool)->io::Result<()> { Ok(()) } }
    pub use Tty as PlatformTty;
}

pub use self::unix::PlatformTty as Tty;
