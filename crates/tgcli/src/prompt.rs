use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use tgcli_core::{ports::Prompter, Error, Result};

type KeySource = Box<dyn FnMut() -> io::Result<Event>>;

/// Line-based prompts: labels on stderr, answers from stdin.
///
/// Secrets are read key by key with echo off when stdin is a terminal.
pub struct StdinPrompter<R> {
    input: R,
    keys: Option<KeySource>,
    raw_mode: bool,
}

impl StdinPrompter<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        let tty = io::stdin().is_terminal();
        Self {
            input: io::stdin().lock(),
            keys: tty.then(|| Box::new(event::read) as KeySource),
            raw_mode: tty,
        }
    }
}

impl<R: BufRead> StdinPrompter<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            keys: None,
            raw_mode: false,
        }
    }

    #[cfg(test)]
    fn with_keys(mut self, keys: impl FnMut() -> io::Result<Event> + 'static) -> Self {
        self.keys = Some(Box::new(keys));
        self
    }

    /// Yes/no question; empty input picks `default`.
    pub fn confirm(&mut self, label: &str, default: bool) -> Result<bool> {
        let suffix = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.prompt(&format!("{label} {suffix}"))?;
        Ok(match answer.trim().to_ascii_lowercase().as_str() {
            "" => default,
            a => a.starts_with('y'),
        })
    }
}

fn write_label(label: &str) -> Result<()> {
    let mut err = io::stderr().lock();
    write!(err, "{label}: ")?;
    err.flush()?;
    Ok(())
}

/// Restores cooked mode on every exit path.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Assemble a line from key events without echoing anything.
fn read_hidden(events: impl IntoIterator<Item = io::Result<Event>>) -> Result<String> {
    let mut secret = String::new();
    for ev in events {
        match ev? {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) if kind != KeyEventKind::Release => match code {
                KeyCode::Enter => return Ok(secret),
                KeyCode::Char('c' | 'd') if modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(Error::InvalidArgument("input cancelled".to_string()));
                }
                KeyCode::Backspace => {
                    secret.pop();
                }
                KeyCode::Char(c) => secret.push(c),
                _ => {}
            },
            Event::Paste(text) => secret.push_str(text.trim_end_matches(['\r', '\n'])),
            _ => {}
        }
    }
    Err(Error::InvalidArgument("no input".to_string()))
}

impl<R: BufRead> Prompter for StdinPrompter<R> {
    fn prompt(&mut self, label: &str) -> Result<String> {
        write_label(label)?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::InvalidArgument(format!("no input for {label:?}")));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn prompt_secret(&mut self, label: &str) -> Result<String> {
        // Piped input has nothing to hide.
        if self.keys.is_none() {
            return self.prompt(label);
        }
        write_label(label)?;
        let raw = if self.raw_mode {
            Some(RawMode::enable()?)
        } else {
            None
        };
        let keys = &mut self.keys;
        let secret = read_hidden(std::iter::from_fn(|| keys.as_mut().map(|next| next())));
        drop(raw);
        eprintln!();
        secret
    }
}
