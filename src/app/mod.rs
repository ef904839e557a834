use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Axis, Block, Chart, Clear, Dataset, GraphType, Paragraph, Wrap},
};

use crate::file_cache::{FileCache, PutStatus, human_file_size};
use crate::selection::Selection;
use crate::upload::Upload;

/// Which pane receives key input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Upload,
    Sensors,
    Files,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Upload => Pane::Sensors,
            Pane::Sensors => Pane::Files,
            Pane::Files => Pane::Upload,
        }
    }

    fn prev(self) -> Self {
        match self {
            Pane::Upload => Pane::Files,
            Pane::Sensors => Pane::Upload,
            Pane::Files => Pane::Sensors,
        }
    }
}

/// The main application which holds the state and logic of the application.
#[derive(Debug)]
pub struct App {
    /// Is the application running?
    running: bool,
    /// Pane that has keyboard focus.
    focus: Pane,
    /// Cursor row inside the focused list pane.
    nav_item_selected: usize,
    /// Path the user is typing in the upload pane.
    upload_input: String,
    /// Status message shown under the upload input.
    status: String,
    cache: FileCache,
    selection: Selection,
    /// Parsed upload waiting for the user to confirm overwriting a cached file.
    pending_overwrite: Option<Upload>,
    /// Paths given on the command line, uploaded one at a time.
    upload_queue: VecDeque<PathBuf>,
}

impl App {
    /// Construct a new instance of [`App`].
    pub fn new(cache: FileCache, queued: Vec<PathBuf>) -> Self {
        let status = if cache.is_empty() {
            "Type the path of a .csv file and press Enter to upload it.".to_string()
        } else {
            format!(
                "{} cached file(s). Tab to the Files pane to open one, or upload a new .csv.",
                cache.len()
            )
        };
        Self {
            running: false,
            focus: Pane::Upload,
            nav_item_selected: 0,
            upload_input: String::new(),
            status,
            cache,
            selection: Selection::new(),
            pending_overwrite: None,
            upload_queue: queued.into(),
        }
    }

    /// Run the application's main loop.
    pub fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        self.running = true;
        while self.running {
            self.process_queue();
            terminal.draw(|frame| self.render(frame))?;
            self.handle_crossterm_events()?;
        }
        Ok(())
    }

    /// Upload queued paths until one of them needs an overwrite decision.
    fn process_queue(&mut self) {
        while self.pending_overwrite.is_none() {
            let Some(path) = self.upload_queue.pop_front() else {
                break;
            };
            self.upload_path(path);
        }
    }

    /// Renders the user interface.
    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Percentage(25), Constraint::Percentage(75)])
            .split(area);

        let nav_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(layout[0]);

        let body_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![
                Constraint::Length(3),
                Constraint::Length(4),
                Constraint::Min(5),
            ])
            .split(layout[1]);

        self.render_sensors(frame, nav_layout[0]);
        self.render_files(frame, nav_layout[1]);

        // --- Body top: upload path input ---
        let input = Paragraph::new(Line::from(vec![
            Span::raw(self.upload_input.clone()),
            if self.focus == Pane::Upload {
                Span::raw("_").slow_blink()
            } else {
                Span::raw("")
            },
        ]))
        .block(self.pane_block("Upload CSV (path, Enter)", Pane::Upload));
        frame.render_widget(input, body_layout[0]);

        let mut status_text = Text::default();
        status_text.extend([Line::from(self.status.clone())]);
        status_text.extend([Line::from(Span::styled(
            "Tab=Switch pane  ↑/↓=Navigate  Space=Toggle/Open  Esc/Ctrl+C=Quit",
            Style::default().fg(Color::Gray),
        ))]);
        frame.render_widget(
            Paragraph::new(status_text)
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title("Status")),
            body_layout[1],
        );

        self.render_chart(frame, body_layout[2]);

        if self.pending_overwrite.is_some() {
            self.render_overwrite_prompt(frame, area);
        }
    }

    fn pane_block(&self, title: &'static str, pane: Pane) -> Block<'static> {
        if self.focus == pane {
            Block::bordered()
                .title(title)
                .style(Style::default().fg(Color::Cyan))
        } else {
            Block::bordered().title(title)
        }
    }

    fn list_line(&self, pane: Pane, index: usize, text: String) -> Line<'static> {
        let color = if self.focus == pane && self.nav_item_selected == index {
            Color::Cyan
        } else {
            Color::White
        };
        Line::from(Span::styled(text, Style::default().fg(color)))
    }

    fn render_sensors(&self, frame: &mut Frame, area: Rect) {
        let sensors = self.selection.sensor_list(&self.cache);
        let mut text = Text::default();
        if sensors.is_empty() {
            text.extend([Line::from("<open a file to list its sensors>")]);
        }
        for (i, sensor) in sensors.iter().enumerate() {
            let mark = if self.selection.is_selected(sensor) {
                "[x]"
            } else {
                "[ ]"
            };
            text.extend([self.list_line(Pane::Sensors, i, format!("{mark} {sensor}"))]);
        }
        frame.render_widget(
            Paragraph::new(text).block(self.pane_block("Sensors", Pane::Sensors)),
            area,
        );
    }

    fn render_files(&self, frame: &mut Frame, area: Rect) {
        let mut text = Text::default();
        if self.cache.is_empty() {
            text.extend([Line::from("<no cached .csv files>")]);
        }
        for (i, record) in self.cache.records().enumerate() {
            let active = self.selection.selected_file() == Some(record.name.as_str());
            let line = format!(
                "{} {} ({})",
                if active { ">" } else { " " },
                record.name,
                human_file_size(record.size)
            );
            text.extend([self.list_line(Pane::Files, i, line)]);
        }
        frame.render_widget(
            Paragraph::new(text).block(self.pane_block("Cached Files", Pane::Files)),
            area,
        );
    }

    fn render_chart(&self, frame: &mut Frame, area: Rect) {
        let chart_data = self.selection.series();
        let Some((y_min, y_max)) = chart_data.bounds() else {
            let mut placeholder = Text::default();
            placeholder.extend([Line::from("Select sensors to display chart")]);
            frame.render_widget(
                Paragraph::new(placeholder).block(Block::bordered().title("Sensor Data Chart")),
                area,
            );
            return;
        };

        let points: Vec<Vec<(f64, f64)>> =
            chart_data.series.iter().map(|s| s.points()).collect();
        let datasets: Vec<Dataset> = chart_data
            .series
            .iter()
            .zip(&points)
            .map(|(series, data)| {
                Dataset::default()
                    .name(series.sensor.clone())
                    .marker(ratatui::symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(series.color)
                    .data(data)
            })
            .collect();

        let labels = &chart_data.labels;
        let x_max = (labels.len().saturating_sub(1) as f64).max(1.0);
        let x_labels: Vec<String> = match labels.len() {
            0 => Vec::new(),
            1 => vec![labels[0].clone()],
            n => vec![
                labels[0].clone(),
                labels[(n - 1) / 2].clone(),
                labels[n - 1].clone(),
            ],
        };
        let y_labels = vec![
            format!("{y_min:.2}"),
            format!("{:.2}", (y_min + y_max) / 2.0),
            format!("{y_max:.2}"),
        ];

        let title = match self.selection.selected_file() {
            Some(name) => format!("Sensor Data Chart: {name}"),
            None => "Sensor Data Chart".to_string(),
        };
        let chart = Chart::new(datasets)
            .block(Block::bordered().title(title))
            .x_axis(
                Axis::default()
                    .title("Timestamp")
                    .bounds([0.0, x_max])
                    .labels(x_labels),
            )
            .y_axis(
                Axis::default()
                    .title("Value")
                    .bounds([y_min, y_max])
                    .labels(y_labels),
            );
        frame.render_widget(chart, area);
    }

    fn render_overwrite_prompt(&self, frame: &mut Frame, area: Rect) {
        let Some(upload) = &self.pending_overwrite else {
            return;
        };
        let mut text = Text::default();
        text.extend([Line::from(format!(
            "\"{}\" is already cached.",
            upload.name
        ))]);
        if let Some(existing) = self.cache.record(&upload.name) {
            text.extend([
                Line::from(format!("Size: {}", human_file_size(existing.size))),
                Line::from(format!("Uploaded: {}", format_time(existing.uploaded_at))),
                Line::from(format!(
                    "Last modified: {}",
                    format_time(existing.last_modified_at)
                )),
            ]);
        }
        text.extend([
            Line::from(""),
            Line::from(Span::styled(
                "Overwrite it? (y/n)",
                Style::default().fg(Color::Yellow),
            )),
        ]);

        let popup = centered(area, 50, 9);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(text)
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title("Overwrite file?").fg(Color::Yellow)),
            popup,
        );
    }

    /// Reads the crossterm events and updates the state of [`App`].
    fn handle_crossterm_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => self.on_key_event(key),
                Event::Mouse(_) => {}
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
        Ok(())
    }

    /// Handles the key events and updates the state of [`App`].
    fn on_key_event(&mut self, key: KeyEvent) {
        if matches!(
            (key.modifiers, key.code),
            (
                KeyModifiers::CONTROL,
                KeyCode::Char('c') | KeyCode::Char('C')
            )
        ) {
            self.quit();
            return;
        }

        if self.pending_overwrite.is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.resolve_overwrite(true),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.resolve_overwrite(false)
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {
                self.quit();
                return;
            }
            KeyCode::Tab => {
                self.focus = self.focus.next();
                self.nav_item_selected = 0;
                return;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                self.nav_item_selected = 0;
                return;
            }
            _ => {}
        }

        match self.focus {
            Pane::Upload => self.handle_upload_input(key),
            Pane::Sensors | Pane::Files => self.handle_list_input(key),
        }
    }

    fn handle_upload_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => {
                self.upload_input.push(c);
            }
            KeyCode::Backspace => {
                self.upload_input.pop();
            }
            KeyCode::Enter => {
                let path = self.upload_input.trim().to_string();
                if path.is_empty() {
                    self.status = "Path cannot be empty.".into();
                    return;
                }
                self.upload_input.clear();
                self.upload_path(PathBuf::from(path));
            }
            _ => {}
        }
    }

    fn handle_list_input(&mut self, key: KeyEvent) {
        let len = match self.focus {
            Pane::Sensors => self.selection.sensor_list(&self.cache).len(),
            _ => self.cache.len(),
        };
        match key.code {
            KeyCode::Up => {
                if self.nav_item_selected > 0 {
                    self.nav_item_selected -= 1;
                }
            }
            KeyCode::Down => {
                if self.nav_item_selected + 1 < len {
                    self.nav_item_selected += 1;
                }
            }
            KeyCode::Char(' ') | KeyCode::Enter => {
                if self.nav_item_selected >= len {
                    return;
                }
                if self.focus == Pane::Sensors {
                    self.toggle_sensor_at(self.nav_item_selected);
                } else {
                    self.open_file_at(self.nav_item_selected);
                }
            }
            _ => {}
        }
    }

    fn toggle_sensor_at(&mut self, index: usize) {
        let Some(sensor) = self.selection.sensor_list(&self.cache).get(index).cloned() else {
            return;
        };
        match self.selection.toggle_sensor(&self.cache, &sensor) {
            Ok(true) => self.status = format!("Plotting {sensor}."),
            Ok(false) => self.status = format!("Removed {sensor} from the chart."),
            Err(e) => self.status = format!("{e}"),
        }
    }

    fn open_file_at(&mut self, index: usize) {
        let Some(name) = self.cache.records().nth(index).map(|r| r.name.clone()) else {
            return;
        };
        self.open_file(&name);
    }

    fn open_file(&mut self, name: &str) {
        match self.selection.select_file(&self.cache, name) {
            Ok(()) => {
                let parsed = self.cache.get(name).map(|p| (p.rows.len(), p.sensor_list.len()));
                if let Ok((rows, sensors)) = parsed {
                    self.status = format!("Opened {name}: {rows} rows, {sensors} sensors.");
                }
            }
            Err(e) => {
                log::warn!("Could not open {name}: {e}");
                self.status = format!("{e}");
            }
        }
    }

    /// Read and parse `path`; ask before replacing a cached file of the same name.
    /// Failures leave the cache and the selection as they were.
    fn upload_path(&mut self, path: PathBuf) {
        let upload = match Upload::from_path(&path) {
            Ok(upload) => upload,
            Err(e) => {
                log::warn!("Upload of {} failed: {e}", path.display());
                self.status = format!("Failed to load {}: {e}", path.display());
                return;
            }
        };
        if self.cache.record(&upload.name).is_some() {
            self.status = format!("{} is already cached. Overwrite it? (y/n)", upload.name);
            self.pending_overwrite = Some(upload);
            return;
        }
        self.store_upload(upload, true);
    }

    fn resolve_overwrite(&mut self, confirmed: bool) {
        if let Some(upload) = self.pending_overwrite.take() {
            self.store_upload(upload, confirmed);
        }
    }

    fn store_upload(&mut self, upload: Upload, confirmed: bool) {
        let name = upload.name.clone();
        match self.cache.put(upload, |_| confirmed) {
            Ok(PutStatus::Inserted | PutStatus::OverwriteConfirmed) => {
                self.open_file(&name);
            }
            Ok(PutStatus::OverwriteDeclined) => {
                self.status = format!("Kept the cached copy of {name}.");
            }
            Err(e) => {
                log::error!("Could not cache {name}: {e}");
                self.status = format!("Could not cache {name}: {e}");
            }
        }
    }

    fn quit(&mut self) {
        self.running = false;
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_cache::CachePolicy;
    use crate::store::MemoryStore;
    use ratatui::{Terminal, backend::TestBackend};
    use std::fs;

    fn app() -> App {
        App::new(
            FileCache::load(Box::new(MemoryStore::new()), CachePolicy::default()),
            Vec::new(),
        )
    }

    fn press(app: &mut App, code: KeyCode) {
        app.on_key_event(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn write_csv(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn typed_path_uploads_and_selects_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "room.csv", "Device Time,Temp,Humidity\n1,20,50\n");
        let mut app = app();

        type_text(&mut app, path.to_str().unwrap());
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.selection.selected_file(), Some("room.csv"));
        assert_eq!(app.selection.sensor_list(&app.cache), ["Temp", "Humidity"]);
        assert!(app.upload_input.is_empty());
    }

    #[test]
    fn sensor_pane_toggles_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "room.csv", "t,Temp,Humidity\n1,20,50\n2,21,55\n");
        let mut app = app();
        app.upload_path(path);

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));

        let chart = app.selection.series();
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].sensor, "Humidity");
        assert_eq!(chart.series[0].data, vec![50.0, 55.0]);
    }

    #[test]
    fn bad_upload_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_csv(dir.path(), "good.csv", "t,a\n1,2\n");
        let bad = write_csv(dir.path(), "bad.csv", "t,a\n");
        let mut app = app();
        app.upload_path(good);
        app.upload_path(bad);

        assert_eq!(app.cache.len(), 1);
        assert_eq!(app.selection.selected_file(), Some("good.csv"));
        assert!(app.status.starts_with("Failed to load"));
    }

    #[test]
    fn overwrite_prompt_declined_keeps_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "t,x\n1,2\n");
        let mut app = app();
        app.upload_path(path.clone());
        let before = app.cache.record("a.csv").unwrap().clone();

        fs::write(&path, "t,y\n1,2\n").unwrap();
        app.upload_path(path);
        assert!(app.pending_overwrite.is_some());

        press(&mut app, KeyCode::Char('n'));
        assert!(app.pending_overwrite.is_none());
        assert_eq!(app.cache.record("a.csv").unwrap(), &before);
    }

    #[test]
    fn overwrite_prompt_confirmed_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "t,x\n1,2\n");
        let mut app = app();
        app.upload_path(path.clone());

        fs::write(&path, "t,y\n1,2\n").unwrap();
        app.upload_path(path);
        press(&mut app, KeyCode::Char('y'));

        assert_eq!(app.cache.get("a.csv").unwrap().sensor_list, vec!["y"]);
        assert_eq!(app.selection.sensor_list(&app.cache), ["y"]);
    }

    #[test]
    fn queue_pauses_on_overwrite_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_csv(dir.path(), "a.csv", "t,x\n1,2\n");
        let other = write_csv(dir.path(), "b.csv", "t,z\n1,2\n");
        let cache = FileCache::load(Box::new(MemoryStore::new()), CachePolicy::default());
        let mut app = App::new(cache, vec![first.clone(), first, other]);

        app.process_queue();
        assert!(app.pending_overwrite.is_some());
        assert_eq!(app.upload_queue.len(), 1);

        press(&mut app, KeyCode::Esc);
        app.process_queue();
        assert_eq!(app.cache.len(), 2);
        assert_eq!(app.selection.selected_file(), Some("b.csv"));
    }

    #[test]
    fn files_pane_opens_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_csv(dir.path(), "a.csv", "t,x\n1,2\n");
        let b = write_csv(dir.path(), "b.csv", "t,z\n1,2\n");
        let mut app = app();
        app.upload_path(a);
        app.upload_path(b);
        assert_eq!(app.selection.selected_file(), Some("b.csv"));

        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.selection.selected_file(), Some("a.csv"));
    }

    #[test]
    fn renders_chart_and_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "t,x\n1,2\n2,5\n3,4\n");
        let mut app = app();
        app.upload_path(path.clone());
        app.selection.toggle_sensor(&app.cache, "x").unwrap();
        app.upload_path(path);

        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Sensor Data Chart"));
        assert!(screen.contains("Overwrite it? (y/n)"));
        assert!(screen.contains("[x] x"));
    }

    #[test]
    fn chart_title_names_selected_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "a.csv", "t,x\n1,2\n2,5\n");
        let mut app = app();
        app.upload_path(path);
        app.selection.toggle_sensor(&app.cache, "x").unwrap();

        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();
        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Sensor Data Chart: a.csv"));
    }
}
