use eframe::{App, Frame, egui};
use log::{debug, error};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::enums::{BatchEvent, CredentialMode, ResultDisplayType};
use crate::models::structs::{ConnectionInfo, ResultTable};
use crate::session::SessionList;
use crate::{config, connection, driver_mssql, export, fanout, result_text};

/// One finished target shown as its own tab.
pub struct ResultTab {
    pub title: String,
    pub tables: Vec<ResultTable>,
    pub selected_table: usize,
}

/// Result of a background connect attempt: server, credential, databases.
type ConnectResult = Result<(String, CredentialMode, Vec<String>), String>;

pub struct MultiSql {
    pub runtime: Option<Arc<tokio::runtime::Runtime>>,
    pub sessions: SessionList,
    pub store: connection::ConnectionStore,
    pub prefs: config::AppPreferences,
    pub query_text: String,
    pub filter_text: String,

    // Batch state
    pub results_text: Arc<Mutex<String>>,
    pub error_text: String,
    pub progress_text: String,
    pub elapsed_text: String,
    pub is_running: bool,
    pub cancel: Option<CancellationToken>,
    pub events: Option<Receiver<BatchEvent>>,
    pub batch_started: Option<Instant>,
    // Display mode captured when the batch starts, so mid-run combo
    // changes cannot mix formats.
    pub batch_display: ResultDisplayType,
    pub first_header_shown: bool,
    pub combined_location: export::SaveLocation,
    pub folder_location: export::SaveLocation,

    pub result_tabs: Vec<ResultTab>,
    pub selected_tab: usize,

    // Connect dialog
    pub show_connect: bool,
    pub connect_server: String,
    pub connect_integrated: bool,
    pub connect_user: String,
    pub connect_password: String,
    pub connect_error: String,
    pub is_connecting: bool,
    pub connect_rx: Option<Receiver<ConnectResult>>,
    pub known_connections: Vec<ConnectionInfo>,
}

impl MultiSql {
    pub fn new() -> Self {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => Some(Arc::new(rt)),
            Err(e) => {
                error!("Failed to create runtime: {}", e);
                None
            }
        };
        let store = connection::ConnectionStore::open_default();
        let known_connections = store.load();
        Self {
            runtime,
            sessions: SessionList::new(),
            store,
            prefs: config::AppPreferences::load(),
            query_text: config::load_editor_content().unwrap_or_default(),
            filter_text: String::new(),
            results_text: Arc::new(Mutex::new(String::new())),
            error_text: String::new(),
            progress_text: String::new(),
            elapsed_text: String::new(),
            is_running: false,
            cancel: None,
            events: None,
            batch_started: None,
            batch_display: ResultDisplayType::Text,
            first_header_shown: false,
            combined_location: export::SaveLocation::new(),
            folder_location: export::SaveLocation::new(),
            result_tabs: Vec::new(),
            selected_tab: 0,
            show_connect: true,
            connect_server: String::new(),
            connect_integrated: false,
            connect_user: String::new(),
            connect_password: String::new(),
            connect_error: String::new(),
            is_connecting: false,
            connect_rx: None,
            known_connections,
        }
    }

    fn add_error(&mut self, text: &str) {
        if !self.error_text.is_empty() {
            self.error_text.push('\n');
        }
        self.error_text.push_str(text);
    }

    // ---------- batch orchestration ----------

    fn run_query(&mut self) {
        if self.is_running || self.query_text.trim().is_empty() {
            return;
        }
        let targets = self.sessions.checked_targets();
        if targets.is_empty() {
            return;
        }
        let Some(runtime) = self.runtime.clone() else {
            self.add_error("No async runtime available.");
            return;
        };
        if let Err(e) = config::save_editor_content(&self.query_text) {
            error!("Failed to autosave editor content: {}", e);
        }
        let _ = self.prefs.save();

        self.error_text.clear();
        self.elapsed_text.clear();
        if let Ok(mut buf) = self.results_text.lock() {
            buf.clear();
        }
        self.result_tabs.clear();
        self.selected_tab = 0;
        self.first_header_shown = false;
        self.combined_location.reset();
        self.folder_location.reset();
        self.batch_display = self.prefs.result_display_type;
        self.progress_text = format!("Completed 0 of {}", targets.len());

        let runner = Arc::new(fanout::MssqlRunner::from_sessions(&self.sessions));
        let (tx, rx) = mpsc::channel();
        self.events = Some(rx);
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.batch_started = Some(Instant::now());
        self.is_running = true;

        let options = fanout::BatchOptions {
            run_in_sequence: self.prefs.run_in_sequence,
            connection_timeout_secs: self.prefs.effective_timeout_secs(),
        };
        let script = self.query_text.clone();
        runtime.spawn(async move {
            fanout::run_batch(runner, targets, &script, &options, tx, token).await;
        });
    }

    fn cancel_query(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
            self.progress_text = fanout::CANCELLED_PROGRESS_TEXT.to_string();
        }
    }

    fn drain_events(&mut self) {
        let mut pending = Vec::new();
        if let Some(rx) = &self.events {
            while let Ok(event) = rx.try_recv() {
                pending.push(event);
            }
        }
        for event in pending {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::TargetStarted {
                server, database, ..
            } => {
                debug!("Running query on {}.{}", server, database);
            }
            BatchEvent::TargetFinished {
                target_id,
                server,
                database,
                tables,
            } => {
                if self.prefs.deselect_on_completion {
                    self.sessions.uncheck(target_id);
                }
                self.present_target(&server, &database, tables);
            }
            BatchEvent::TargetFailed { error, .. } => {
                self.add_error(&error);
            }
            BatchEvent::Progress { done, total } => {
                self.progress_text = format!("Completed {} of {}", done, total);
            }
            BatchEvent::Cancelled => {
                self.progress_text = fanout::CANCELLED_PROGRESS_TEXT.to_string();
                self.add_error(&format!(
                    "Query execution cancelled by user.\n{}",
                    result_text::print_dashes(0)
                ));
                self.finish_batch();
            }
            BatchEvent::Finished { elapsed } => {
                self.progress_text.clear();
                self.elapsed_text = fanout::format_elapsed(elapsed);
                self.finish_batch();
            }
        }
    }

    fn finish_batch(&mut self) {
        self.is_running = false;
        self.cancel = None;
        self.events = None;
        self.batch_started = None;
    }

    fn present_target(&mut self, server: &str, database: &str, tables: Vec<ResultTable>) {
        if self.batch_display == ResultDisplayType::DifferentTabs {
            let empty = tables.iter().all(|t| t.row_count() == 0);
            if empty && self.prefs.ignore_empty_results {
                return;
            }
            self.result_tabs.push(ResultTab {
                title: format!("{} ({})", database, server),
                tables,
                selected_table: 0,
            });
            return;
        }

        let sections = result_text::render_tables(
            &tables,
            self.batch_display,
            &self.prefs.delimiter,
            self.prefs.ignore_empty_results,
        );
        if sections.is_empty() {
            return;
        }

        match self.batch_display {
            ResultDisplayType::CombinedFile => {
                let path = self
                    .combined_location
                    .ensure(export::dialogs::prompt_combined_file);
                if let Some(path) = path {
                    if let Err(e) =
                        export::append_to_combined_file(&path, database, server, &sections)
                    {
                        self.add_error(&result_text::format_target_error(server, database, &e));
                    }
                } else {
                    self.add_error(&result_text::format_target_error(
                        server,
                        database,
                        "No file selected for combined results.",
                    ));
                }
            }
            ResultDisplayType::DatabaseFileName => {
                let folder = self
                    .folder_location
                    .ensure(export::dialogs::prompt_results_folder);
                if let Some(folder) = folder {
                    if let Err(e) = export::write_database_file(&folder, database, &sections) {
                        self.add_error(&result_text::format_target_error(server, database, &e));
                    }
                } else {
                    self.add_error(&result_text::format_target_error(
                        server,
                        database,
                        "No folder selected for results.",
                    ));
                }
            }
            ResultDisplayType::TextFirstHeaderOnly => {
                let text = result_text::target_text(
                    &sections,
                    database,
                    server,
                    true,
                    self.first_header_shown,
                );
                if !text.is_empty() {
                    self.first_header_shown = true;
                    result_text::append_chunked(&self.results_text, &text);
                }
            }
            _ => {
                let text = result_text::target_text(&sections, database, server, false, false);
                if !text.is_empty() {
                    result_text::append_chunked(&self.results_text, &text);
                }
            }
        }
    }

    // ---------- connect dialog ----------

    fn start_connect(&mut self) {
        let server = self.connect_server.trim().to_string();
        if server.is_empty() {
            self.connect_error = "Server name is required.".to_string();
            return;
        }
        let credential = if self.connect_integrated {
            CredentialMode::Integrated
        } else {
            if self.connect_user.trim().is_empty() {
                self.connect_error = "User name is required.".to_string();
                return;
            }
            CredentialMode::SqlServer {
                user: self.connect_user.trim().to_string(),
                password: self.connect_password.clone(),
            }
        };
        let Some(runtime) = self.runtime.clone() else {
            self.connect_error = "No async runtime available.".to_string();
            return;
        };
        self.connect_error.clear();
        self.is_connecting = true;

        let (tx, rx) = mpsc::channel();
        self.connect_rx = Some(rx);
        let timeout = Duration::from_secs(u64::from(self.prefs.effective_timeout_secs()));
        runtime.spawn(async move {
            let cfg = driver_mssql::MssqlTargetConfig {
                server: server.clone(),
                database: String::new(),
                credential: credential.clone(),
                connect_timeout: timeout,
            };
            let result = match driver_mssql::connect(&cfg).await {
                Ok(mut client) => driver_mssql::fetch_database_list(&mut client)
                    .await
                    .map(|dbs| (server, credential, dbs)),
                Err(e) => Err(e),
            };
            let _ = tx.send(result);
        });
    }

    fn poll_connect(&mut self) {
        let result = match &self.connect_rx {
            Some(rx) => match rx.try_recv() {
                Ok(result) => result,
                Err(_) => return,
            },
            None => return,
        };
        self.connect_rx = None;
        self.is_connecting = false;
        match result {
            Ok((server, credential, databases)) => {
                if let Err(e) = self.store.save(
                    &server,
                    credential.user_name(),
                    credential.is_integrated(),
                ) {
                    error!("Failed to save connection history: {}", e);
                }
                self.known_connections = self.store.load();
                self.sessions.add_server(&server, credential, databases);
                self.show_connect = false;
                self.connect_password.clear();
            }
            Err(e) => {
                self.connect_error = e;
            }
        }
    }

    fn apply_known_connection(&mut self, info: &ConnectionInfo) {
        self.connect_server = info.server.clone();
        self.connect_integrated = info.integrated_security;
        self.connect_user = info.user_name.clone();
        self.connect_password.clear();
    }

    // ---------- file actions ----------

    fn open_sql_file(&mut self) {
        if let Some(path) = export::dialogs::prompt_open_sql_file() {
            match std::fs::read_to_string(&path) {
                Ok(text) => self.query_text = text,
                Err(e) => self.add_error(&format!("Failed to open {}: {}", path.display(), e)),
            }
        }
    }

    fn save_sql_file(&mut self) {
        if let Some(path) = export::dialogs::prompt_save_sql_file() {
            let path = ensure_extension(path, "sql");
            if let Err(e) = std::fs::write(&path, &self.query_text) {
                self.add_error(&format!("Failed to save {}: {}", path.display(), e));
            }
        }
    }

    fn export_tab_csv(&mut self, tab_index: usize) {
        let Some(tab) = self.result_tabs.get(tab_index) else {
            return;
        };
        let Some(table) = tab.tables.get(tab.selected_table) else {
            return;
        };
        if let Some(path) = export::dialogs::prompt_save_csv_file(&tab.title) {
            let path = ensure_extension(path, "csv");
            if let Err(e) = export::export_table_to_csv(&path, table) {
                self.add_error(&format!("Failed to export {}: {}", path.display(), e));
            }
        }
    }

    fn save_selection(&mut self) {
        if let Some(path) = export::dialogs::prompt_save_selection_file() {
            let path = ensure_extension(path, "txt");
            if let Err(e) = self.sessions.save_selection(&path) {
                self.add_error(&e);
            }
        }
    }

    fn load_selection(&mut self) {
        if let Some(path) = export::dialogs::prompt_open_selection_file() {
            match self.sessions.load_selection(&path) {
                Ok(applied) => debug!("Applied saved selection to {} databases.", applied),
                Err(e) => self.add_error(&e),
            }
        }
    }

    // ---------- ui panels ----------

    fn render_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open Script").clicked() {
                self.open_sql_file();
            }
            if ui.button("Save Script").clicked() {
                self.save_sql_file();
            }
            ui.separator();

            egui::ComboBox::from_label("Results")
                .selected_text(self.prefs.result_display_type.label())
                .show_ui(ui, |ui| {
                    for display in ResultDisplayType::ALL {
                        ui.selectable_value(
                            &mut self.prefs.result_display_type,
                            display,
                            display.label(),
                        );
                    }
                });
            if self.prefs.result_display_type.uses_delimiter() {
                ui.label("Delimiter:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.prefs.delimiter).desired_width(40.0),
                );
            }
            ui.label("Timeout (s):");
            ui.add(egui::DragValue::new(&mut self.prefs.connection_timeout_secs).range(0..=600));
            ui.checkbox(&mut self.prefs.run_in_sequence, "Run in sequence");
            ui.checkbox(&mut self.prefs.deselect_on_completion, "Deselect on completion");
            ui.checkbox(&mut self.prefs.ignore_empty_results, "Ignore empty results");
        });
        ui.horizontal(|ui| {
            if self.is_running {
                if ui.button("Cancel").clicked() {
                    self.cancel_query();
                }
                ui.spinner();
            } else if ui
                .add_enabled(!self.sessions.is_empty(), egui::Button::new("Run"))
                .clicked()
            {
                self.run_query();
            }
            if !self.progress_text.is_empty() {
                ui.label(&self.progress_text);
            }
            if let Some(started) = self.batch_started {
                ui.label(fanout::format_elapsed(started.elapsed()));
            } else if !self.elapsed_text.is_empty() {
                ui.label(&self.elapsed_text);
            }
        });
    }

    fn render_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Connect").clicked() {
                self.show_connect = true;
            }
            if ui.button("Save Selection").clicked() {
                self.save_selection();
            }
            if ui.button("Load Selection").clicked() {
                self.load_selection();
            }
        });
        ui.horizontal(|ui| {
            ui.label("Filter:");
            ui.text_edit_singleline(&mut self.filter_text);
        });
        ui.horizontal(|ui| {
            if ui.button("Select All").clicked() {
                self.sessions.set_all_checked(true, &self.filter_text);
            }
            if ui.button("Select None").clicked() {
                self.sessions.set_all_checked(false, &self.filter_text);
            }
        });
        ui.label(self.sessions.selected_count_text());
        ui.separator();

        let filter = self.filter_text.clone();
        let mut toggles: Vec<(i64, bool)> = Vec::new();
        let mut remove_server: Option<String> = None;
        let mut open_ssms: Option<String> = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            for session in self.sessions.servers() {
                ui.horizontal(|ui| {
                    ui.strong(&session.server);
                    if ui.small_button("SSMS").clicked() {
                        open_ssms = Some(session.server.clone());
                    }
                    if ui.small_button("Disconnect").clicked() {
                        remove_server = Some(session.server.clone());
                    }
                });
                for target in &session.targets {
                    if !SessionList::matches_filter(target, &filter) {
                        continue;
                    }
                    let mut checked = target.checked;
                    if ui.checkbox(&mut checked, &target.database).changed() {
                        toggles.push((target.id, checked));
                    }
                }
                ui.separator();
            }
        });

        for (id, checked) in toggles {
            self.sessions.set_checked(id, checked);
        }
        if let Some(server) = remove_server {
            self.sessions.remove_server(&server);
        }
        if let Some(server) = open_ssms {
            config::open_in_ssms(&server);
        }
    }

    fn render_connect_dialog(&mut self, ctx: &egui::Context) {
        if !self.show_connect {
            return;
        }
        let mut open = self.show_connect;
        let mut do_connect = false;
        let mut recall: Option<ConnectionInfo> = None;
        egui::Window::new("Connect to Server")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Server:");
                    ui.text_edit_singleline(&mut self.connect_server);
                });
                ui.checkbox(&mut self.connect_integrated, "Integrated security");
                if !self.connect_integrated {
                    ui.horizontal(|ui| {
                        ui.label("User:");
                        ui.text_edit_singleline(&mut self.connect_user);
                    });
                    ui.horizontal(|ui| {
                        ui.label("Password:");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.connect_password).password(true),
                        );
                    });
                }
                ui.horizontal(|ui| {
                    if self.is_connecting {
                        ui.spinner();
                        ui.label("Connecting...");
                    } else if ui.button("Connect").clicked() {
                        do_connect = true;
                    }
                });
                if !self.connect_error.is_empty() {
                    ui.colored_label(egui::Color32::LIGHT_RED, &self.connect_error);
                }
                if !self.known_connections.is_empty() {
                    ui.separator();
                    ui.label("Recent connections:");
                    for info in &self.known_connections {
                        let label = if info.integrated_security {
                            format!("{} (integrated)", info.server)
                        } else {
                            format!("{} ({})", info.server, info.user_name)
                        };
                        if ui.selectable_label(false, label).clicked() {
                            recall = Some(info.clone());
                        }
                    }
                }
            });
        self.show_connect = open;
        if let Some(info) = recall {
            self.apply_known_connection(&info);
        }
        if do_connect {
            self.start_connect();
        }
    }

    fn render_results(&mut self, ui: &mut egui::Ui) {
        if self.batch_display == ResultDisplayType::DifferentTabs {
            self.render_result_tabs(ui);
            return;
        }
        egui::ScrollArea::both()
            .id_salt("results_text")
            .show(ui, |ui| {
                if let Ok(buf) = self.results_text.lock() {
                    let mut text: &str = &buf;
                    ui.add(
                        egui::TextEdit::multiline(&mut text)
                            .font(egui::TextStyle::Monospace)
                            .desired_width(f32::INFINITY),
                    );
                }
            });
    }

    fn render_result_tabs(&mut self, ui: &mut egui::Ui) {
        if self.result_tabs.is_empty() {
            ui.label("No results.");
            return;
        }
        if self.selected_tab >= self.result_tabs.len() {
            self.selected_tab = self.result_tabs.len() - 1;
        }
        let mut export_tab: Option<usize> = None;
        ui.horizontal_wrapped(|ui| {
            for (i, tab) in self.result_tabs.iter().enumerate() {
                if ui
                    .selectable_label(i == self.selected_tab, &tab.title)
                    .clicked()
                {
                    self.selected_tab = i;
                }
            }
        });
        ui.horizontal(|ui| {
            let tab = &mut self.result_tabs[self.selected_tab];
            if tab.tables.len() > 1 {
                for (i, table) in tab.tables.iter().enumerate() {
                    if ui.selectable_label(i == tab.selected_table, &table.name).clicked() {
                        tab.selected_table = i;
                    }
                }
            }
            if ui.button("Export CSV").clicked() {
                export_tab = Some(self.selected_tab);
            }
        });
        if let Some(i) = export_tab {
            self.export_tab_csv(i);
        }

        let tab = &self.result_tabs[self.selected_tab];
        let Some(table) = tab.tables.get(tab.selected_table) else {
            return;
        };
        let headers = table.headers();
        use egui_extras::{Column, TableBuilder};
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .column(Column::auto())
            .columns(Column::auto().at_least(60.0), headers.len())
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("#");
                });
                for name in &headers {
                    header.col(|ui| {
                        ui.strong(name);
                    });
                }
            })
            .body(|body| {
                body.rows(18.0, table.rows.len(), |mut row| {
                    let index = row.index();
                    row.col(|ui| {
                        ui.label((index + 1).to_string());
                    });
                    if let Some(cells) = table.rows.get(index) {
                        for cell in cells {
                            row.col(|ui| {
                                ui.label(cell);
                            });
                        }
                    }
                });
            });
    }
}

impl Default for MultiSql {
    fn default() -> Self {
        Self::new()
    }
}

impl App for MultiSql {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_connect();
        self.drain_events();
        if self.is_running || self.is_connecting {
            ctx.request_repaint_after(Duration::from_millis(150));
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.render_toolbar(ui);
        });

        egui::SidePanel::left("databases")
            .default_width(280.0)
            .show(ctx, |ui| {
                self.render_sidebar(ui);
            });

        if !self.error_text.is_empty() {
            egui::TopBottomPanel::bottom("errors")
                .default_height(120.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        ui.colored_label(egui::Color32::LIGHT_RED, &self.error_text);
                    });
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            let editor_height = ui.available_height() * 0.4;
            egui::ScrollArea::vertical()
                .id_salt("editor")
                .max_height(editor_height)
                .show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.query_text)
                            .font(egui::TextStyle::Monospace)
                            .code_editor()
                            .desired_width(f32::INFINITY)
                            .desired_rows(12),
                    );
                });
            ui.separator();
            self.render_results(ui);
        });

        self.render_connect_dialog(ctx);
    }
}

fn ensure_extension(path: PathBuf, ext: &str) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(ext)
    }
}
