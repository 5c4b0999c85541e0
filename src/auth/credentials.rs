//! Interactive username/password prompt.
//!
//! The terminal is switched to raw mode for the duration of the prompt so the
//! password can be read without echo. Raw mode is held by a guard and
//! restored when the guard drops, on success and on every error path.

use std::fmt;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::warn;

/// Username and password held in memory for one sign-in.
///
/// The password is redacted in Debug output.
#[derive(Clone)]
pub struct Credentials {
    /// Account name sent to the identity provider.
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password. Never log the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Errors while prompting for credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialReadError {
    /// The terminal could not be switched to raw mode.
    #[error("cannot switch terminal to raw mode: {0}")]
    RawMode(#[source] io::Error),
    /// Reading a line from the terminal failed or was interrupted.
    #[error("failed to read credentials: {0}")]
    Read(#[source] io::Error),
}

impl CredentialReadError {
    /// Returns true when the user aborted the prompt (Ctrl-C / Ctrl-D).
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Read(error)
                if matches!(error.kind(), io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof)
        )
    }
}

/// A terminal that can be switched into raw mode and read line by line.
pub trait Console {
    /// Switches the terminal to raw mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the mode cannot be changed.
    fn enable_raw_mode(&mut self) -> io::Result<()>;

    /// Restores the mode that was active before [`Console::enable_raw_mode`].
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the mode cannot be changed.
    fn disable_raw_mode(&mut self) -> io::Result<()>;

    /// Prints `prompt` and reads one line, echoing typed characters when `echo` is set.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, `Interrupted` on Ctrl-C, or
    /// `UnexpectedEof` on Ctrl-D at an empty line.
    fn read_line(&mut self, prompt: &str, echo: bool) -> io::Result<String>;
}

/// The process's controlling terminal, driven through crossterm.
#[derive(Debug)]
pub struct TerminalConsole {
    out: io::Stdout,
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalConsole {
    /// Creates a console writing prompts to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Console for TerminalConsole {
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn read_line(&mut self, prompt: &str, echo: bool) -> io::Result<String> {
        write!(self.out, "{prompt}")?;
        self.out.flush()?;

        let mut line = String::new();
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            let control = key.modifiers.contains(KeyModifiers::CONTROL);
            match key.code {
                KeyCode::Enter => break,
                KeyCode::Char('c') if control => {
                    write!(self.out, "\r\n")?;
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "prompt interrupted"));
                }
                KeyCode::Char('d') if control && line.is_empty() => {
                    write!(self.out, "\r\n")?;
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of input"));
                }
                KeyCode::Backspace => {
                    if line.pop().is_some() && echo {
                        write!(self.out, "\u{8} \u{8}")?;
                    }
                }
                KeyCode::Char(ch) if !control => {
                    line.push(ch);
                    if echo {
                        write!(self.out, "{ch}")?;
                    }
                }
                _ => {}
            }
            self.out.flush()?;
        }

        // Raw mode does not translate \n, so move to column 0 explicitly.
        write!(self.out, "\r\n")?;
        self.out.flush()?;
        Ok(line)
    }
}

/// Holds a console in raw mode; restores it exactly once on drop.
struct RawModeGuard<'a, C: Console + ?Sized> {
    console: &'a mut C,
}

impl<'a, C: Console + ?Sized> RawModeGuard<'a, C> {
    fn acquire(console: &'a mut C) -> io::Result<Self> {
        console.enable_raw_mode()?;
        Ok(Self { console })
    }
}

impl<C: Console + ?Sized> Deref for RawModeGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &*self.console
    }
}

impl<C: Console + ?Sized> DerefMut for RawModeGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut *self.console
    }
}

impl<C: Console + ?Sized> Drop for RawModeGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(error) = self.console.disable_raw_mode() {
            warn!(error = %error, "failed to restore terminal mode");
        }
    }
}

/// Prompts for a username (echoed) and a password (not echoed).
///
/// # Errors
///
/// Returns [`CredentialReadError::RawMode`] when raw mode cannot be entered and
/// [`CredentialReadError::Read`] when either line cannot be read. The terminal
/// mode is restored before this function returns in all cases where it was
/// changed.
pub fn read_credentials<C: Console + ?Sized>(
    console: &mut C,
) -> Result<Credentials, CredentialReadError> {
    let mut terminal = RawModeGuard::acquire(console).map_err(CredentialReadError::RawMode)?;

    let username = terminal
        .read_line("Username: ", true)
        .map_err(CredentialReadError::Read)?;
    let password = terminal
        .read_line("Password: ", false)
        .map_err(CredentialReadError::Read)?;

    Ok(Credentials::new(username.trim(), password))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    struct ScriptedConsole {
        lines: VecDeque<io::Result<String>>,
        fail_enable: bool,
        raw: bool,
        enabled: usize,
        restored: usize,
        prompts: Vec<(String, bool, bool)>,
    }

    impl ScriptedConsole {
        fn with_lines(lines: Vec<io::Result<String>>) -> Self {
            Self {
                lines: lines.into(),
                ..Self::default()
            }
        }
    }

    impl Console for ScriptedConsole {
        fn enable_raw_mode(&mut self) -> io::Result<()> {
            if self.fail_enable {
                return Err(io::Error::other("not a tty"));
            }
            self.enabled += 1;
            self.raw = true;
            Ok(())
        }

        fn disable_raw_mode(&mut self) -> io::Result<()> {
            self.restored += 1;
            self.raw = false;
            Ok(())
        }

        fn read_line(&mut self, prompt: &str, echo: bool) -> io::Result<String> {
            self.prompts.push((prompt.to_string(), echo, self.raw));
            self.lines
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::UnexpectedEof)))
        }
    }

    #[test]
    fn test_read_credentials_success_restores_once() {
        let mut console = ScriptedConsole::with_lines(vec![
            Ok("user@example.com".to_string()),
            Ok("hunter2".to_string()),
        ]);

        let credentials = read_credentials(&mut console).unwrap();
        assert_eq!(credentials.username, "user@example.com");
        assert_eq!(credentials.password(), "hunter2");
        assert_eq!(console.enabled, 1);
        assert_eq!(console.restored, 1);
        assert!(!console.raw);
    }

    #[test]
    fn test_read_credentials_prompts_in_raw_mode_without_password_echo() {
        let mut console =
            ScriptedConsole::with_lines(vec![Ok("user".to_string()), Ok("pw".to_string())]);
        read_credentials(&mut console).unwrap();

        assert_eq!(
            console.prompts,
            vec![
                ("Username: ".to_string(), true, true),
                ("Password: ".to_string(), false, true),
            ]
        );
    }

    #[test]
    fn test_password_read_failure_restores_exactly_once() {
        let mut console = ScriptedConsole::with_lines(vec![
            Ok("user".to_string()),
            Err(io::Error::other("read failed")),
        ]);

        let result = read_credentials(&mut console);
        assert!(matches!(result, Err(CredentialReadError::Read(_))));
        assert_eq!(console.enabled, 1);
        assert_eq!(console.restored, 1);
        assert!(!console.raw);
    }

    #[test]
    fn test_username_read_failure_restores_and_skips_password() {
        let mut console = ScriptedConsole::with_lines(vec![Err(io::Error::from(
            io::ErrorKind::Interrupted,
        ))]);

        let error = read_credentials(&mut console).unwrap_err();
        assert!(error.is_interrupted());
        assert_eq!(console.prompts.len(), 1);
        assert_eq!(console.restored, 1);
    }

    #[test]
    fn test_raw_mode_failure_is_surfaced_without_restore() {
        let mut console = ScriptedConsole {
            fail_enable: true,
            ..ScriptedConsole::default()
        };

        let result = read_credentials(&mut console);
        assert!(matches!(result, Err(CredentialReadError::RawMode(_))));
        assert_eq!(console.restored, 0);
        assert!(console.prompts.is_empty());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("user", "super_secret_pw");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("user"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret_pw"));
    }
}
