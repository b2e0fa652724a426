//! Full-screen terminal pager over a [`ReadingSession`].

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute, queue};

use crate::reader::{Page, PageLayout, ReadingSession};

/// Rows reserved below the text for the status line.
const STATUS_ROWS: u16 = 2;

/// What a key press asks the pager to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Next,
    Previous,
    First,
    Last,
    Quit,
    Ignore,
}

impl Action {
    pub fn from_key(key: KeyEvent) -> Self {
        if key.kind == KeyEventKind::Release {
            return Action::Ignore;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
            KeyCode::Char(' ')
            | KeyCode::Char('n')
            | KeyCode::Char('j')
            | KeyCode::Right
            | KeyCode::Down
            | KeyCode::PageDown
            | KeyCode::Enter => Action::Next,
            KeyCode::Char('b')
            | KeyCode::Char('p')
            | KeyCode::Char('k')
            | KeyCode::Left
            | KeyCode::Up
            | KeyCode::PageUp
            | KeyCode::Backspace => Action::Previous,
            KeyCode::Char('g') | KeyCode::Home => Action::First,
            KeyCode::Char('G') | KeyCode::End => Action::Last,
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => Action::Ignore,
        }
    }
}

/// Apply `action` to the session. Returns false when the pager should stop.
///
/// Moving forward from the last page leaves the position at the end of the
/// text, which marks the book as finished.
pub fn apply(session: &mut ReadingSession, action: Action) -> bool {
    let (number, start, end) = match session.current_page() {
        Some(page) => (page.number, page.start, page.end),
        None => return false,
    };

    match action {
        Action::Next => {
            session.seek(end);
            !session.is_finished()
        }
        Action::Previous => {
            let prev_start = number
                .checked_sub(1)
                .and_then(|n| session.page(n))
                .map(|p| p.start);
            if let Some(prev_start) = prev_start {
                session.seek(prev_start);
            }
            true
        }
        Action::First => {
            session.seek(0);
            true
        }
        Action::Last => {
            let last = session.page_count().saturating_sub(1);
            let last_start = session.page(last).map(|p| p.start);
            if let Some(last_start) = last_start {
                session.seek(last_start);
            }
            true
        }
        Action::Quit => {
            // Resume at the top of the page being shown.
            session.seek(start);
            false
        }
        Action::Ignore => true,
    }
}

/// Page layout filling the terminal, minus the status line.
pub fn terminal_layout() -> PageLayout {
    match terminal::size() {
        Ok((cols, rows)) => PageLayout::new(cols as usize, rows.saturating_sub(STATUS_ROWS) as usize),
        Err(_) => PageLayout::default(),
    }
}

/// Restores the terminal when dropped, even on early return.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn draw(out: &mut impl Write, title: &str, page: &Page<'_>, percent: u8) -> io::Result<()> {
    queue!(out, terminal::Clear(ClearType::All))?;
    for (row, line) in page.lines.iter().enumerate() {
        queue!(out, cursor::MoveTo(0, row as u16), Print(line))?;
    }

    let (_, rows) = terminal::size().unwrap_or((80, 24));
    let status = format!(
        " {}  page {}/{}  {}%   [space] next  [b] back  [g/G] first/last  [q] quit",
        title,
        page.number + 1,
        page.total,
        percent
    );
    queue!(
        out,
        cursor::MoveTo(0, rows.saturating_sub(1)),
        SetAttribute(Attribute::Reverse),
        Print(status),
        SetAttribute(Attribute::Reset)
    )?;
    out.flush()
}

/// Run the pager until the reader quits or reads past the last page.
pub fn run(session: &mut ReadingSession) -> io::Result<()> {
    if session.current_page().is_none() {
        return Ok(());
    }

    let _guard = TerminalGuard::enter()?;
    let mut stdout = io::stdout();

    loop {
        match session.current_page() {
            Some(page) => draw(&mut stdout, session.title(), &page, session.percent())?,
            None => return Ok(()),
        }

        let keep_going = match event::read()? {
            Event::Key(key) => apply(session, Action::from_key(key)),
            Event::Resize(_, _) => {
                session.relayout(terminal_layout());
                true
            }
            _ => true,
        };

        if !keep_going {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ReadingSession {
        let text = (1..=9).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        ReadingSession::new("b", "Book", text, PageLayout::new(20, 3))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Action::from_key(key(KeyCode::Char(' '))), Action::Next);
        assert_eq!(Action::from_key(key(KeyCode::Left)), Action::Previous);
        assert_eq!(Action::from_key(key(KeyCode::Char('G'))), Action::Last);
        assert_eq!(Action::from_key(key(KeyCode::Char('q'))), Action::Quit);
        assert_eq!(
            Action::from_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Action::Quit
        );
        assert_eq!(Action::from_key(key(KeyCode::Char('x'))), Action::Ignore);
    }

    #[test]
    fn test_navigation() {
        let mut s = session();
        assert!(apply(&mut s, Action::Next));
        assert_eq!(s.current_page().unwrap().number, 1);

        assert!(apply(&mut s, Action::Last));
        assert_eq!(s.current_page().unwrap().number, 2);

        assert!(apply(&mut s, Action::Previous));
        assert_eq!(s.current_page().unwrap().number, 1);

        assert!(apply(&mut s, Action::First));
        assert_eq!(s.position(), 0);

        // Previous on the first page stays put.
        assert!(apply(&mut s, Action::Previous));
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn test_next_past_last_page_finishes() {
        let mut s = session();
        apply(&mut s, Action::Last);
        assert!(!apply(&mut s, Action::Next));
        assert!(s.is_finished());
        assert_eq!(s.position(), s.len());
    }

    #[test]
    fn test_quit_rewinds_to_page_start() {
        let mut s = session();
        apply(&mut s, Action::Next);
        let start = s.current_page().unwrap().start;
        s.seek(start + 3);
        assert!(!apply(&mut s, Action::Quit));
        assert_eq!(s.position(), start);
    }
}
