//! A shell running inside a PTY, viewed through a vt100 screen model.

use std::io::{Read, Write};
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;

use anyhow::{Context, Result, bail};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use crate::terminal::{Screen, SessionConfig, Terminal, TerminalFactory};

const PROMPT: &str = "> ";

/// Manages a shell running inside a PTY. Output is read on a background
/// thread and applied to the screen model whenever a snapshot is taken.
pub struct PtyTerminal {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: Receiver<Vec<u8>>,
    parser: vt100::Parser,
}

impl PtyTerminal {
    /// Spawn the configured shell with a plain `> ` prompt and no user rc
    /// files.
    pub fn spawn(config: &SessionConfig) -> Result<Self> {
        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(pty_size(config.rows, config.cols))
            .context("Failed to open PTY")?;

        let cmd = shell_command(config)?;
        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", config.shell))?;
        debug!(shell = %config.shell, pid = ?child.process_id(), "shell spawned");

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        Ok(Self {
            master: pair.master,
            child,
            writer,
            output: spawn_reader(reader),
            parser: vt100::Parser::new(config.rows, config.cols, 0),
        })
    }

    /// Factory suitable for [`crate::Engine::with_terminal`].
    pub fn factory() -> TerminalFactory {
        Box::new(|config: &SessionConfig| {
            Ok(Box::new(PtyTerminal::spawn(config)?) as Box<dyn Terminal>)
        })
    }

    /// Check if the shell is still running
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    fn drain(&mut self) {
        loop {
            match self.output.try_recv() {
                Ok(chunk) => self.parser.process(&chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }
}

impl Terminal for PtyTerminal {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.is_running() {
            bail!("shell exited");
        }
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.drain();
        self.master
            .resize(pty_size(rows, cols))
            .context("Failed to resize PTY")?;
        self.parser.set_size(rows, cols);
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Screen> {
        self.drain();
        Ok(Screen::from_parser(&self.parser))
    }
}

impl Drop for PtyTerminal {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(err) = self.child.kill() {
                debug!(error = %err, "failed to kill shell");
            }
        }
    }
}

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn shell_command(config: &SessionConfig) -> Result<CommandBuilder> {
    let mut cmd = CommandBuilder::new(&config.shell);
    let args: &[&str] = match config.shell.as_str() {
        "bash" => &["--noprofile", "--norc", "-i"],
        "zsh" => &["--no-rcs", "-i"],
        "fish" => &[
            "--no-config",
            "--private",
            "-C",
            "function fish_prompt; echo -n '> '; end",
        ],
        "sh" => &["-i"],
        "nu" => &[
            "--no-config-file",
            "-e",
            "$env.PROMPT_COMMAND = {|| '> '}; $env.PROMPT_INDICATOR = ''",
        ],
        "xonsh" => &["--no-rc", "-i", "-D", "PROMPT=> "],
        "pwsh" => &[
            "-NoLogo",
            "-NoProfile",
            "-NoExit",
            "-Command",
            "function prompt { '> ' }",
        ],
        other => bail!("unsupported shell {other}"),
    };
    cmd.args(args);
    cmd.cwd(std::env::current_dir().context("Failed to read working directory")?);
    cmd.env("TERM", "xterm-256color");
    cmd.env("PS1", PROMPT);
    cmd.env("PROMPT", PROMPT);
    for (key, value) in &config.env {
        cmd.env(key, value);
    }
    Ok(cmd)
}

/// Spawns a background thread to read from the PTY
fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = channel();

    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(_) => break,
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::ffi::OsStr;
    use std::time::{Duration, Instant};

    fn config() -> SessionConfig {
        SessionConfig {
            shell: "sh".to_string(),
            rows: 10,
            cols: 40,
            env: BTreeMap::from([("TAPEREEL_TEST".to_string(), "marker".to_string())]),
        }
    }

    fn wait_for(term: &mut PtyTerminal, needle: &str) -> Screen {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let screen = term.snapshot().unwrap();
            if screen.text().contains(needle) || Instant::now() > deadline {
                return screen;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_shell_command_sets_prompt_and_env() {
        let cmd = shell_command(&config()).unwrap();
        assert_eq!(cmd.get_env("TERM"), Some(OsStr::new("xterm-256color")));
        assert_eq!(cmd.get_env("PS1"), Some(OsStr::new(PROMPT)));
        assert_eq!(cmd.get_env("TAPEREEL_TEST"), Some(OsStr::new("marker")));
    }

    #[test]
    fn test_unsupported_shell() {
        let mut cfg = config();
        cfg.shell = "tcsh".to_string();
        assert!(shell_command(&cfg).is_err());
    }

    #[test]
    fn test_sh_round_trip() {
        let mut term = PtyTerminal::spawn(&config()).unwrap();
        term.write(b"echo $TAPEREEL_TEST\r").unwrap();
        let screen = wait_for(&mut term, "marker\n");
        assert!(screen.text().contains("marker"), "{}", screen.text());
        assert_eq!((screen.rows, screen.cols), (10, 40));
    }
}
