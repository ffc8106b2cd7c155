//! Ratatui front end over [`App`].
//!
//! One loop: drain queued results, draw, poll input with a short timeout.
//! A panic while rendering is logged and the next frame is drawn as usual.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use tracing::{error, info};

use crate::clipboard::XselClipboard;
use crate::clock;
use crate::config::AppConfig;
use crate::model::Record;
use crate::session::SessionSlot;
use crate::ui::app::{App, FormField, Services, View};
use crate::ui::components::theme::ThemePalette;
use crate::ui::queue::panic_message;
use crate::ui::shortcuts;
use crate::ui::worker::WorkerPool;

const TICK_RATE: Duration = Duration::from_millis(30);
const WORKER_THREADS: usize = 8;
const MASK: char = '•';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
    ToggleTheme,
}

pub fn run_tui(config: AppConfig) -> Result<()> {
    let services = Services {
        auth: Arc::new(crate::authenticator(&config)),
        slot: Arc::new(SessionSlot::new()),
        spawner: Arc::new(WorkerPool::new(WORKER_THREADS).context("starting worker pool")?),
        clipboard: Arc::new(XselClipboard::new(Some(config.clipboard_timeout))),
        clock: clock::system(),
    };
    let mut app = App::new(services, &config);
    match config.op_config_path() {
        Ok(path) => app.restore(path),
        Err(e) => {
            info!(error = %e, "no vault config to restore from");
            app.state.status = "sign in to continue".to_string();
        }
    }

    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let result = event_loop(&mut terminal, &mut app);
    teardown_terminal()?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let mut theme_dark = true;
    loop {
        app.tick();

        let palette = if theme_dark {
            ThemePalette::dark()
        } else {
            ThemePalette::light()
        };
        render_boundary(|| terminal.draw(|f| draw(f, app, palette)).map(|_| ()))
            .context("drawing frame")?;

        if event::poll(TICK_RATE)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match handle_key(app, key) {
                Flow::Quit => break,
                Flow::ToggleTheme => theme_dark = !theme_dark,
                Flow::Continue => {}
            }
        }
    }
    Ok(())
}

pub fn handle_key(app: &mut App, key: KeyEvent) -> Flow {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return Flow::Quit,
        KeyCode::Char('c') if ctrl => return Flow::Quit,
        KeyCode::F(2) => return Flow::ToggleTheme,
        _ => {}
    }

    match app.view() {
        View::SignIn => match key.code {
            KeyCode::Tab => app.focus_next(),
            KeyCode::Enter => {
                if app.state.form.focus == FormField::MasterPassword {
                    app.submit_sign_in();
                } else {
                    app.focus_next();
                }
            }
            KeyCode::Backspace => app.input_backspace(),
            KeyCode::Char('w') if ctrl => app.input_clear(),
            KeyCode::Char(c) if !ctrl => app.input_char(c),
            _ => {}
        },
        View::Search => match key.code {
            KeyCode::Up => app.select_prev(),
            KeyCode::Down => app.select_next(),
            KeyCode::Enter => match app.state.selected {
                Some(i) => app.select(i),
                None => app.search(),
            },
            KeyCode::Char('u') if ctrl => app.copy_username(),
            KeyCode::Char('p') if ctrl => app.copy_password(),
            KeyCode::Char('r') if ctrl => app.list(true),
            KeyCode::Char('w') if ctrl => app.input_clear(),
            KeyCode::Char('l') if ctrl => app.sign_out(),
            KeyCode::Backspace => app.input_backspace(),
            KeyCode::Char(c) if !ctrl => app.input_char(c),
            _ => {}
        },
    }
    Flow::Continue
}

/// Run one frame's drawing. A panic is logged and the frame skipped.
fn render_boundary<E>(draw: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
    match catch_unwind(AssertUnwindSafe(draw)) {
        Ok(drawn) => drawn,
        Err(payload) => {
            error!(panic = %panic_message(&*payload), "frame render panicked");
            Ok(())
        }
    }
}

pub fn draw(f: &mut Frame, app: &App, palette: ThemePalette) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Min(0),    // body
            Constraint::Length(1), // status
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    match app.view() {
        View::SignIn => draw_sign_in(f, chunks[0], app, palette),
        View::Search => draw_search(f, chunks[0], app, palette),
    }

    let busy = app.state.signing_in || app.state.fetching_items() || app.state.fetching_item();
    let status = if busy {
        format!("… {}", app.state.status)
    } else {
        app.state.status.clone()
    };
    f.render_widget(
        Paragraph::new(Span::styled(status, palette.status_style(&app.state.status))),
        chunks[1],
    );
    f.render_widget(
        Paragraph::new(Span::styled(footer(app.view()), palette.hint_style())),
        chunks[2],
    );
}

fn footer(view: View) -> String {
    match view {
        View::SignIn => format!(
            "{} next field · {} sign in · {} clear · {} quit",
            shortcuts::NEXT_FIELD,
            shortcuts::SUBMIT,
            shortcuts::CLEAR,
            shortcuts::QUIT
        ),
        View::Search => format!(
            "{} select · {} copy user · {} copy password · {} refresh · {} sign out · {} theme · {} quit",
            shortcuts::MOVE,
            shortcuts::COPY_USERNAME,
            shortcuts::COPY_PASSWORD,
            shortcuts::REFRESH,
            shortcuts::SIGN_OUT,
            shortcuts::THEME,
            shortcuts::QUIT
        ),
    }
}

fn draw_sign_in(f: &mut Frame, area: Rect, app: &App, palette: ThemePalette) {
    let fields = [
        FormField::Address,
        FormField::Email,
        FormField::SecretKey,
        FormField::MasterPassword,
    ];
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            std::iter::once(Constraint::Length(2))
                .chain(fields.iter().map(|_| Constraint::Length(3)))
                .chain(std::iter::once(Constraint::Min(0))),
        )
        .split(area);

    f.render_widget(
        Paragraph::new(Span::styled("Sign in to your vault", palette.title())),
        rows[0],
    );
    let form = &app.state.form;
    for (i, field) in fields.iter().enumerate() {
        let value = form.value(*field);
        let shown = if field.is_secret() {
            MASK.to_string().repeat(value.chars().count())
        } else if *field == FormField::Address && value.is_empty() {
            crate::op::DEFAULT_SIGNIN_ADDRESS.to_string()
        } else {
            value.to_string()
        };
        let focused = form.focus == *field;
        let block = Block::default()
            .borders(Borders::ALL)
            .title(field.label())
            .border_style(palette.border_style(focused));
        f.render_widget(Paragraph::new(shown).block(block), rows[i + 1]);
    }
}

fn draw_search(f: &mut Frame, area: Rect, app: &App, palette: ThemePalette) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let query = Paragraph::new(app.state.query.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Search")
            .border_style(palette.border_style(true)),
    );
    f.render_widget(query, rows[0]);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let items: Vec<ListItem> = app.state.results.iter().map(result_item(palette)).collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Records ({})", app.state.results.len()))
                .border_style(palette.border_style(false)),
        )
        .highlight_style(palette.selected_style());
    let mut list_state = ListState::default();
    list_state.select(app.state.selected);
    f.render_stateful_widget(list, cols[0], &mut list_state);

    let detail = Paragraph::new(detail_lines(app, palette))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Detail")
                .border_style(palette.border_style(false)),
        );
    f.render_widget(detail, cols[1]);
}

fn result_item(palette: ThemePalette) -> impl Fn(&Record) -> ListItem<'static> {
    move |record| {
        let mut spans = vec![Span::raw(record.title().to_string())];
        if !record.overview.ainfo.is_empty() {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                record.overview.ainfo.clone(),
                palette.hint_style(),
            ));
        }
        ListItem::new(Line::from(spans))
    }
}

fn detail_lines(app: &App, palette: ThemePalette) -> Vec<Line<'static>> {
    if app.state.fetching_item() {
        return vec![Line::from(Span::styled("loading…", palette.hint_style()))];
    }
    let Some(record) = app.state.detail.as_ref() else {
        return vec![Line::from(Span::styled(
            "select a record to see its details",
            palette.hint_style(),
        ))];
    };

    let mut lines = vec![Line::from(Span::styled(
        record.title().to_string(),
        palette.title(),
    ))];
    let Some(detail) = record.details.as_ref() else {
        return lines;
    };
    let masked = MASK.to_string().repeat(8);
    if let Some(user) = detail.username() {
        lines.push(labelled("username", user.to_string(), palette));
    }
    if detail.password().is_some() {
        lines.push(labelled("password", masked.clone(), palette));
    }
    for section in &detail.sections {
        if section.fields.is_empty() {
            continue;
        }
        lines.push(Line::default());
        if !section.title.is_empty() {
            lines.push(Line::from(Span::styled(
                section.title.clone(),
                Style::default().fg(palette.accent_alt),
            )));
        }
        for field in &section.fields {
            let value = if field.kind == "concealed" {
                masked.clone()
            } else {
                field.value.to_string()
            };
            lines.push(labelled(&field.title, value, palette));
        }
    }
    if !detail.notes.is_empty() {
        lines.push(Line::default());
        lines.extend(detail.notes.lines().map(|l| Line::from(l.to_string())));
    }
    lines
}

fn labelled(label: &str, value: String, palette: ThemePalette) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), palette.hint_style()),
        Span::styled(value, Style::default().fg(palette.fg)),
    ])
}

fn teardown_terminal() -> Result<()> {
    let mut stdout = io::stdout();
    disable_raw_mode()?;
    execute!(stdout, LeaveAlternateScreen)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{ClipboardError, ClipboardSink};
    use crate::op::{OpError, VaultCli};
    use crate::session::Authenticator;
    use crate::store::StoreOptions;
    use crate::ui::worker::ManualSpawner;
    use ratatui::backend::TestBackend;

    struct OfflineCli;

    impl VaultCli for OfflineCli {
        fn sign_in(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String, OpError> {
            Ok("tok".into())
        }
        fn probe(&self, _: &str) -> Result<(), OpError> {
            Ok(())
        }
        fn list_items(&self, _: &str) -> Result<Vec<u8>, OpError> {
            Ok(b"[]".to_vec())
        }
        fn get_item(&self, _: &str, _: &str) -> Result<Vec<u8>, OpError> {
            Err(OpError::vault(145, "not found"))
        }
    }

    struct NoClipboard;

    impl ClipboardSink for NoClipboard {
        fn copy(&self, _: &str) -> Result<(), ClipboardError> {
            Ok(())
        }
    }

    fn app() -> App {
        let clock = clock::system();
        let auth = Authenticator::new(
            Arc::new(OfflineCli),
            clock.clone(),
            StoreOptions {
                sweep_interval: None,
                ..StoreOptions::default()
            },
            Duration::from_secs(1800),
        );
        App::new(
            Services {
                auth: Arc::new(auth),
                slot: Arc::new(SessionSlot::new()),
                spawner: Arc::new(ManualSpawner::new()),
                clipboard: Arc::new(NoClipboard),
                clock,
            },
            &AppConfig::default(),
        )
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal
            .draw(|f| draw(f, app, ThemePalette::dark()))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn press(app: &mut App, code: KeyCode) -> Flow {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn sign_in_form_masks_secrets() {
        let mut app = app();
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        for c in "hunter2".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.state.form.master_password.as_str(), "hunter2");

        let screen = render(&app);
        assert!(screen.contains("Master password"));
        assert!(screen.contains(crate::op::DEFAULT_SIGNIN_ADDRESS));
        assert!(!screen.contains("hunter2"));
        assert!(screen.contains(&MASK.to_string().repeat(7)));
    }

    #[test]
    fn panicking_frame_is_skipped_and_next_frame_draws() {
        let app = app();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        let skipped = render_boundary(|| {
            terminal
                .draw(|_| panic!("widget blew up"))
                .map(|_| ())
        });
        assert!(skipped.is_ok());

        render_boundary(|| {
            terminal
                .draw(|f| draw(f, &app, ThemePalette::dark()))
                .map(|_| ())
        })
        .unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(screen.contains("Master password"));
    }

    #[test]
    fn escape_quits_and_f2_toggles_theme() {
        let mut app = app();
        assert_eq!(press(&mut app, KeyCode::F(2)), Flow::ToggleTheme);
        assert_eq!(press(&mut app, KeyCode::Esc), Flow::Quit);
        assert_eq!(
            handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Flow::Quit
        );
    }

    #[test]
    fn enter_on_password_field_starts_sign_in() {
        let mut app = app();
        app.state.form.focus = FormField::MasterPassword;
        press(&mut app, KeyCode::Enter);
        assert!(app.state.signing_in);
    }
}
