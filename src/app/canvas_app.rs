//! Main application struct for the patch canvas
//!
//! Contains the CanvasApp which implements eframe::App: it starts the
//! engine host, opens one patch, feeds egui input to the [`Canvas`] and
//! paints the canvas state.

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui::{self, Align, Align2, Color32, FontId, Layout, Pos2, Rect, RichText, Stroke};

use crate::canvas::{Canvas, CanvasKey, CanvasRequest, GuiWidget, MenuItem, ObjectBox, PointerButton, Polarity};
use crate::config::Config;
use crate::engine::{launch, EngineBridge, EngineEvent, EngineHost, Instance, ObjectId, TypeSymbol};
use crate::patch::{Clipboard, GuiDefaults, Patch, PatchError, SharedClipboard};

use super::flags::SharedFlags;
use super::theme;

/// Console lines kept for the status bar.
const CONSOLE_LINES: usize = 100;

/// Height of an inlet or outlet marker.
const EDGE_HEIGHT: f32 = 3.0;

/// Text typed into a new or existing box.
struct BoxEditor {
    /// Box being retyped; a new object when `None`.
    target: Option<ObjectId>,
    /// Canvas position of the box.
    position: Pos2,
    text: String,
}

/// Main application state for the patch canvas
pub struct CanvasApp {
    config: Config,
    host: EngineHost,
    bridge: EngineBridge,
    flags: SharedFlags,
    clipboard: SharedClipboard,
    /// Last clipboard text handed to the system clipboard.
    exported_clipboard: Option<String>,

    canvas: Canvas,
    /// Canvases the current subpatch was opened from.
    parents: Vec<Canvas>,
    file: Option<PathBuf>,

    editor: Option<BoxEditor>,
    /// Screen rect of last frame's context menu.
    menu_rect: Option<Rect>,
    console: Vec<String>,
    dsp_running: bool,
    theme_applied: bool,
}

impl CanvasApp {
    /// Starts the engine and opens `file`, or an empty patch.
    pub fn new(config: Config, file: Option<PathBuf>) -> Result<Self, PatchError> {
        let (bridge, host) = launch(&config.engine, Instance::new());
        log::info!("engine running ({})", host.description());

        let patch = match &file {
            Some(path) => Patch::load_file(bridge.clone(), path).or_else(|error| {
                log::error!("cannot load {}: {}", path.display(), error);
                Patch::open(bridge.clone(), "Untitled")
            })?,
            None => Patch::open(bridge.clone(), "Untitled")?,
        };
        let patch = patch.with_gui_defaults(
            GuiDefaults::with_overrides(&config.gui_defaults),
            theme::template_colours(),
        );

        let flags = SharedFlags::default();
        let clipboard = SharedClipboard::default();
        let canvas = Canvas::new(patch, &config.canvas, &flags, Box::new(clipboard.clone()));

        Ok(Self {
            config,
            host,
            bridge,
            flags,
            clipboard,
            exported_clipboard: None,
            canvas,
            parents: Vec::new(),
            file,
            editor: None,
            menu_rect: None,
            console: Vec::new(),
            dsp_running: false,
            theme_applied: false,
        })
    }

    // ========================================================================
    // Engine and canvas housekeeping
    // ========================================================================

    fn drain_engine_events(&mut self) {
        for event in self.bridge.drain_events() {
            if self.canvas.handle_engine_event(&event) {
                continue;
            }
            match event {
                EngineEvent::Print(line) => {
                    log::info!("{}", line);
                    self.console.push(line);
                    if self.console.len() > CONSOLE_LINES {
                        self.console.remove(0);
                    }
                }
                EngineEvent::DspState(running) => self.dsp_running = running,
                EngineEvent::StateChanged { .. } | EngineEvent::ClipboardText { .. } => {}
            }
        }
    }

    fn handle_requests(&mut self) {
        for request in self.canvas.take_requests() {
            match request {
                CanvasRequest::OpenPatch(patch) => {
                    let patch = patch.with_gui_defaults(
                        GuiDefaults::with_overrides(&self.config.gui_defaults),
                        theme::template_colours(),
                    );
                    let child = Canvas::new(
                        patch,
                        &self.config.canvas,
                        &self.flags,
                        Box::new(self.clipboard.clone()),
                    );
                    self.parents.push(std::mem::replace(&mut self.canvas, child));
                }
                CanvasRequest::OpenHelp(name) => {
                    self.console.push(format!("no help library installed for '{}'", name));
                }
            }
        }
    }

    fn close_subpatch(&mut self) {
        if let Some(parent) = self.parents.pop() {
            self.canvas = parent;
            self.canvas.synchronise(true);
        }
    }

    /// Mirrors the canvas clipboard into the system clipboard.
    fn export_clipboard(&mut self, ctx: &egui::Context) {
        let text = self.clipboard.get_text();
        if text.is_some() && text != self.exported_clipboard {
            if let Some(text) = text.clone() {
                ctx.output_mut(|output| output.copied_text = text);
            }
            self.exported_clipboard = text;
        }
    }

    fn set_dsp(&mut self, running: bool) {
        if let Err(error) = self.bridge.enqueue(move |instance| instance.set_dsp(running)) {
            log::warn!("{}", error);
        }
    }

    fn save(&mut self) {
        let path = self
            .file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.json", self.canvas.title())));
        match self.canvas.patch().save_to(&path) {
            Ok(()) => {
                log::info!("saved {}", path.display());
                self.file = Some(path);
            }
            Err(error) => self.console.push(format!("cannot save {}: {}", path.display(), error)),
        }
    }

    // ========================================================================
    // Input
    // ========================================================================

    fn handle_input(&mut self, ctx: &egui::Context, response: &egui::Response) {
        let origin = response.rect.min;
        let to_view = |position: Pos2| (position - origin).to_pos2();
        let (events, modifiers) = ctx.input(|input| (input.events.clone(), input.modifiers));

        self.flags
            .set_command_locked(modifiers.command || self.flags.get().presentation_mode);
        self.canvas.poll_flags();

        let typing = self.editor.is_some() || ctx.wants_keyboard_input();
        for event in events {
            match event {
                egui::Event::PointerButton {
                    pos,
                    button,
                    pressed,
                    modifiers,
                } => {
                    let Some(button) = pointer_button(button) else {
                        continue;
                    };
                    if pressed {
                        let on_menu = self.menu_rect.is_some_and(|rect| rect.contains(pos));
                        if on_menu || !response.rect.contains(pos) {
                            continue;
                        }
                        self.commit_editor();
                        self.canvas.pointer_pressed(to_view(pos), button, modifiers);
                    } else {
                        self.canvas.pointer_released(to_view(pos), modifiers);
                    }
                }
                egui::Event::PointerMoved(pos) => self.canvas.pointer_moved(to_view(pos), modifiers),
                egui::Event::Copy if !typing => self.canvas.copy_selection(),
                egui::Event::Cut if !typing => {
                    self.canvas.copy_selection();
                    self.canvas.remove_selection();
                }
                egui::Event::Paste(_) if !typing => self.canvas.paste_selection(None),
                egui::Event::Key {
                    key,
                    pressed,
                    modifiers,
                    ..
                } if !typing => self.handle_key(key, pressed, modifiers, response),
                egui::Event::Text(text) if !typing => {
                    for character in text.chars() {
                        self.canvas.key_pressed(CanvasKey::Character(character), modifiers);
                        self.canvas.key_released(CanvasKey::Character(character));
                    }
                }
                _ => {}
            }
        }

        if response.double_clicked() && !self.canvas.is_locked() {
            if let Some(pointer) = response.interact_pointer_pos() {
                self.open_editor(self.canvas.viewport().to_canvas(to_view(pointer)));
            }
        }
    }

    fn handle_key(&mut self, key: egui::Key, pressed: bool, modifiers: egui::Modifiers, response: &egui::Response) {
        if modifiers.command {
            if pressed {
                self.handle_shortcut(key, modifiers, response);
            }
            return;
        }

        let Some(canvas_key) = canvas_key(key) else {
            return;
        };
        if !pressed {
            self.canvas.key_released(canvas_key);
            return;
        }
        if self.canvas.key_pressed(canvas_key, modifiers) {
            return;
        }
        if canvas_key == CanvasKey::Escape {
            self.canvas.cancel_interaction();
            self.canvas.dismiss_menu();
            self.canvas.deselect_all();
        }
    }

    fn handle_shortcut(&mut self, key: egui::Key, modifiers: egui::Modifiers, response: &egui::Response) {
        match key {
            egui::Key::E => self.flags.set_locked(!self.flags.get().locked),
            egui::Key::Z if modifiers.shift => self.canvas.redo(),
            egui::Key::Z => self.canvas.undo(),
            egui::Key::Y => self.canvas.redo(),
            egui::Key::A => self.canvas.select_all(),
            egui::Key::D => self.canvas.duplicate_selection(),
            egui::Key::S => self.save(),
            egui::Key::Num1 if !self.flags.get().locked => {
                let pointer = response.hover_pos().unwrap_or(response.rect.center());
                let view = (pointer - response.rect.min).to_pos2();
                self.open_editor(self.canvas.viewport().to_canvas(view));
            }
            _ => {}
        }
    }

    /// Starts typing into the box under `point`, or a new box there.
    fn open_editor(&mut self, point: Pos2) {
        let existing = self
            .canvas
            .box_at(point)
            .and_then(|object| self.canvas.box_for(object));
        self.editor = Some(match existing {
            Some(object_box) => BoxEditor {
                target: Some(object_box.id()),
                position: object_box.bounds.min,
                text: object_box.text.clone(),
            },
            None => BoxEditor {
                target: None,
                position: point,
                text: String::new(),
            },
        });
    }

    fn commit_editor(&mut self) {
        let Some(editor) = self.editor.take() else {
            return;
        };
        let text = editor.text.trim();
        if text.is_empty() {
            return;
        }
        match editor.target {
            Some(object) => {
                let unchanged = self
                    .canvas
                    .box_for(object)
                    .is_some_and(|object_box| object_box.text == text);
                if !unchanged {
                    self.canvas.rename_box(object, text);
                }
            }
            None => {
                self.canvas.create_object(text, editor.position);
            }
        }
    }

    // ========================================================================
    // Panels
    // ========================================================================

    fn draw_toolbar(&mut self, ui: &mut egui::Ui) -> ToolbarActions {
        let mut actions = ToolbarActions::default();
        let status = self.canvas.command_status();
        let flags = self.flags.get();

        ui.horizontal(|ui| {
            ui.add_space(8.0);

            if !self.parents.is_empty() && ui.button("⬅ Parent").clicked() {
                actions.close_subpatch = true;
            }

            let dirty = if self.canvas.is_dirty() { " *" } else { "" };
            ui.label(
                RichText::new(format!("{}{}", self.canvas.title(), dirty))
                    .size(16.0)
                    .color(theme::text::PRIMARY)
                    .strong(),
            );

            ui.add_space(12.0);
            ui.separator();

            let mode = if flags.locked { "🔒 Run" } else { "✏ Edit" };
            if ui.button(mode).clicked() {
                actions.toggle_lock = true;
            }
            let mut grid = flags.grid_enabled;
            if ui.checkbox(&mut grid, "Grid").changed() {
                actions.grid = Some(grid);
            }
            let mut presentation = flags.presentation_mode;
            if ui.checkbox(&mut presentation, "Presentation").changed() {
                actions.presentation = Some(presentation);
            }

            ui.separator();
            let undo = ui
                .add_enabled(status.can_undo, egui::Button::new("↶ Undo"))
                .on_hover_text(step_label("Undo", status.undo_name));
            if undo.clicked() {
                actions.undo = true;
            }
            let redo = ui
                .add_enabled(status.can_redo, egui::Button::new("↷ Redo"))
                .on_hover_text(step_label("Redo", status.redo_name));
            if redo.clicked() {
                actions.redo = true;
            }
            if ui.button("💾 Save").clicked() {
                actions.save = true;
            }

            ui.separator();
            let (dsp_text, dsp_colour) = if self.dsp_running {
                ("● DSP on", theme::accent::SUCCESS)
            } else {
                ("○ DSP off", theme::text::SECONDARY)
            };
            if ui.button(RichText::new(dsp_text).color(dsp_colour)).clicked() {
                actions.dsp = Some(!self.dsp_running);
            }
        });

        actions
    }

    fn draw_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(8.0);
            let line = self.console.last().map(String::as_str).unwrap_or("Ready");
            ui.label(RichText::new(line).color(theme::text::SECONDARY).small());

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                let (text, colour) = if self.host.is_running() {
                    (format!("● {}", self.host.description()), theme::accent::SUCCESS)
                } else {
                    ("○ engine stopped".to_string(), theme::accent::ERROR)
                };
                ui.label(RichText::new(text).color(colour).small());
            });
        });
    }

    fn draw_sidebar(&mut self, ctx: &egui::Context) {
        if !self.canvas.sidebar().is_visible() {
            return;
        }
        egui::SidePanel::right("sidebar")
            .resizable(false)
            .default_width(180.0)
            .show(ctx, |ui| {
                ui.label(RichText::new("Properties").color(theme::text::PRIMARY).strong());
                ui.separator();
                egui::Grid::new("parameters").num_columns(2).show(ui, |ui| {
                    for parameter in self.canvas.sidebar().parameters() {
                        ui.label(RichText::new(parameter.name).color(theme::text::SECONDARY));
                        ui.label(&parameter.value);
                        ui.end_row();
                    }
                });
                ui.separator();
                let sidebar = self.canvas.sidebar_mut();
                ui.checkbox(&mut sidebar.pinned, "Pin");
            });
    }

    fn draw_context_menu(&mut self, ctx: &egui::Context, origin: Pos2) -> Option<MenuItem> {
        let Some(menu) = self.canvas.context_menu().cloned() else {
            self.menu_rect = None;
            return None;
        };

        let mut chosen = None;
        let area = egui::Area::new(egui::Id::new("canvas_context_menu"))
            .order(egui::Order::Foreground)
            .fixed_pos(origin + menu.position.to_vec2())
            .show(ctx, |ui| {
                egui::Frame::menu(ui.style()).show(ui, |ui| {
                    for (item, enabled) in menu.entries() {
                        if ui.add_enabled(enabled, egui::Button::new(item.label())).clicked() {
                            chosen = Some(item);
                        }
                        if item.ends_group() {
                            ui.separator();
                        }
                    }
                });
            });
        self.menu_rect = Some(area.response.rect);
        chosen
    }

    fn draw_editor(&mut self, ctx: &egui::Context, origin: Pos2) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let position = origin + self.canvas.viewport().to_view(editor.position).to_vec2();

        let mut commit = false;
        let mut cancel = false;
        egui::Area::new(egui::Id::new("box_editor"))
            .order(egui::Order::Foreground)
            .fixed_pos(position)
            .show(ctx, |ui| {
                let response = ui.add(
                    egui::TextEdit::singleline(&mut editor.text)
                        .font(FontId::monospace(12.0))
                        .desired_width(160.0),
                );
                response.request_focus();
                if ui.input(|input| input.key_pressed(egui::Key::Enter)) {
                    commit = true;
                }
                if ui.input(|input| input.key_pressed(egui::Key::Escape)) {
                    cancel = true;
                }
            });

        if commit {
            self.commit_editor();
        } else if cancel {
            self.editor = None;
        }
    }

    // ========================================================================
    // Painting
    // ========================================================================

    fn draw_canvas(&self, painter: &egui::Painter, rect: Rect) {
        let canvas = &self.canvas;
        let viewport = canvas.viewport();
        let to_screen = |point: Pos2| rect.min + viewport.to_view(point).to_vec2();

        painter.rect_filled(rect, 0.0, theme::background::MAIN);
        if canvas.grid().enabled && !canvas.is_locked() {
            for point in canvas.grid().points(viewport.visible_rect()) {
                painter.circle_filled(to_screen(point), 1.0, theme::background::GRID);
            }
        }

        for visual in canvas.connections() {
            let Some(points) = canvas.connection_points(visual) else {
                continue;
            };
            let kind = canvas
                .box_for(visual.connection().source)
                .and_then(|object_box| object_box.outlets.get(visual.connection().outlet))
                .map(|edge| edge.kind)
                .unwrap_or(crate::engine::PortKind::Control);
            let selected = canvas
                .selection()
                .contains(crate::canvas::Selectable::Connection(visual.connection()));
            let points = points.into_iter().map(to_screen).collect();
            painter.add(egui::Shape::line(points, theme::connection_stroke(kind, selected)));
        }

        for object_box in canvas.boxes() {
            let selected = canvas.selection().contains_object(object_box.id());
            self.draw_box(painter, object_box, selected, &to_screen);
        }

        // Labels go on top of every box
        for object_box in canvas.boxes() {
            if let Some(label) = &object_box.label {
                painter.text(
                    to_screen(object_box.bounds.left_top()) + egui::vec2(0.0, -2.0),
                    Align2::LEFT_BOTTOM,
                    label,
                    FontId::proportional(11.0),
                    theme::text::SECONDARY,
                );
            }
        }

        for (anchor, pointer) in canvas.pending_connection_lines() {
            painter.line_segment(
                [to_screen(anchor), to_screen(pointer)],
                Stroke::new(1.0, theme::accent::PRIMARY),
            );
        }

        if let Some(lasso) = canvas.lasso_rect() {
            let lasso = Rect::from_two_pos(to_screen(lasso.min), to_screen(lasso.max));
            painter.rect(
                lasso,
                0.0,
                theme::accent::PRIMARY.gamma_multiply(0.1),
                Stroke::new(1.0, theme::accent::PRIMARY),
            );
        }
    }

    fn draw_box(&self, painter: &egui::Painter, object_box: &ObjectBox, selected: bool, to_screen: &dyn Fn(Pos2) -> Pos2) {
        let rect = Rect::from_two_pos(to_screen(object_box.bounds.min), to_screen(object_box.bounds.max));
        let outline = if selected {
            theme::accent::PRIMARY
        } else if object_box.broken {
            theme::object::BROKEN
        } else {
            theme::object::OUTLINE
        };
        let fill = match object_box.type_symbol {
            TypeSymbol::Message | TypeSymbol::FloatAtom | TypeSymbol::SymbolAtom | TypeSymbol::ListBox => {
                theme::object::MESSAGE_FILL
            }
            TypeSymbol::Comment => Color32::TRANSPARENT,
            _ => theme::object::FILL,
        };
        let stroke = if object_box.type_symbol == TypeSymbol::Comment && !selected {
            Stroke::NONE
        } else {
            Stroke::new(1.0, outline)
        };
        painter.rect(rect, 0.0, fill, stroke);

        match &object_box.widget {
            Some(widget) if widget_has_face(widget) => draw_widget(painter, rect, widget, outline),
            _ => {
                painter.text(
                    rect.left_center() + egui::vec2(4.0, 0.0),
                    Align2::LEFT_CENTER,
                    &object_box.text,
                    FontId::monospace(12.0),
                    if selected { theme::accent::PRIMARY } else { theme::text::PRIMARY },
                );
            }
        }
        if let Some(graph) = self.canvas.graph_for(object_box.id()) {
            draw_graph(painter, rect, graph);
        }

        if self.canvas.presentation_mode() {
            return;
        }
        for polarity in [Polarity::Inlet, Polarity::Outlet] {
            for edge in object_box.edges(polarity) {
                let Some(centre) = object_box.edge_position(polarity, edge.index) else {
                    continue;
                };
                let centre = to_screen(centre);
                let (top, bottom) = match polarity {
                    Polarity::Inlet => (centre.y, centre.y + EDGE_HEIGHT),
                    Polarity::Outlet => (centre.y - EDGE_HEIGHT, centre.y),
                };
                let half = crate::canvas::object_box::PORT_WIDTH / 2.0;
                let marker = Rect::from_min_max(
                    egui::pos2(centre.x - half, top),
                    egui::pos2(centre.x + half, bottom),
                );
                let colour = if edge.targeted {
                    theme::object::TARGETED
                } else {
                    theme::port_colour(edge.kind)
                };
                painter.rect_filled(marker, 0.0, colour);
            }
        }
    }
}

/// Toolbar hint naming the step undo or redo would apply.
fn step_label(verb: &str, step: Option<&str>) -> String {
    match step {
        Some(step) => format!("{} {}", verb, step),
        None => verb.to_string(),
    }
}

/// Contents of a graph-on-parent or array box, scaled down to fit it.
fn draw_graph(painter: &egui::Painter, rect: Rect, graph: &Canvas) {
    let Some(content) = graph.graph_content() else {
        return;
    };
    let inner = rect.shrink(4.0);
    let scale = (inner.width() / content.width().max(1.0))
        .min(inner.height() / content.height().max(1.0))
        .min(1.0);
    let place = |point: Pos2| inner.min + (point - content.min) * scale;

    let painter = painter.with_clip_rect(inner);
    for object_box in graph.boxes() {
        let bounds = Rect::from_two_pos(place(object_box.bounds.min), place(object_box.bounds.max));
        painter.rect_stroke(bounds, 0.0, Stroke::new(1.0, theme::object::OUTLINE));
    }
}

/// Widgets painted as graphics instead of their text.
fn widget_has_face(widget: &GuiWidget) -> bool {
    matches!(
        widget,
        GuiWidget::Toggle { .. }
            | GuiWidget::Bang { .. }
            | GuiWidget::Radio { .. }
            | GuiWidget::Slider { .. }
            | GuiWidget::NumberBox { .. }
    )
}

fn draw_widget(painter: &egui::Painter, rect: Rect, widget: &GuiWidget, colour: Color32) {
    let inner = rect.shrink(3.0);
    match widget {
        GuiWidget::Toggle { on, .. } => {
            if *on {
                let stroke = Stroke::new(2.0, theme::text::PRIMARY);
                painter.line_segment([inner.left_top(), inner.right_bottom()], stroke);
                painter.line_segment([inner.right_top(), inner.left_bottom()], stroke);
            }
        }
        GuiWidget::Bang { latched } => {
            let fill = if *latched { theme::text::PRIMARY } else { Color32::TRANSPARENT };
            let radius = inner.width().min(inner.height()) / 2.0;
            painter.circle(inner.center(), radius, fill, Stroke::new(1.0, colour));
        }
        GuiWidget::Radio {
            vertical,
            count,
            selected,
        } => {
            let count = (*count).max(1);
            let cell = if *vertical {
                egui::vec2(rect.width(), rect.height() / count as f32)
            } else {
                egui::vec2(rect.width() / count as f32, rect.height())
            };
            for index in 0..count {
                let offset = if *vertical {
                    egui::vec2(0.0, cell.y * index as f32)
                } else {
                    egui::vec2(cell.x * index as f32, 0.0)
                };
                let cell_rect = Rect::from_min_size(rect.min + offset, cell);
                painter.rect_stroke(cell_rect, 0.0, Stroke::new(1.0, colour));
                if index == *selected {
                    painter.rect_filled(cell_rect.shrink(3.0), 0.0, theme::text::PRIMARY);
                }
            }
        }
        GuiWidget::Slider {
            vertical,
            min,
            max,
            value,
        } => {
            let range = (*max - *min).abs().max(f32::EPSILON);
            let fraction = ((*value - min.min(*max)) / range).clamp(0.0, 1.0);
            let knob = if *vertical {
                let y = rect.bottom() - rect.height() * fraction;
                [egui::pos2(rect.left(), y), egui::pos2(rect.right(), y)]
            } else {
                let x = rect.left() + rect.width() * fraction;
                [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())]
            };
            painter.line_segment(knob, Stroke::new(3.0, theme::text::PRIMARY));
        }
        GuiWidget::NumberBox { value } => {
            painter.text(
                rect.left_center() + egui::vec2(4.0, 0.0),
                Align2::LEFT_CENTER,
                format!("{}", value),
                FontId::monospace(12.0),
                theme::text::PRIMARY,
            );
        }
        _ => {}
    }
}

fn pointer_button(button: egui::PointerButton) -> Option<PointerButton> {
    match button {
        egui::PointerButton::Primary => Some(PointerButton::Primary),
        egui::PointerButton::Secondary => Some(PointerButton::Secondary),
        egui::PointerButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

fn canvas_key(key: egui::Key) -> Option<CanvasKey> {
    Some(match key {
        egui::Key::ArrowLeft => CanvasKey::Left,
        egui::Key::ArrowRight => CanvasKey::Right,
        egui::Key::ArrowUp => CanvasKey::Up,
        egui::Key::ArrowDown => CanvasKey::Down,
        egui::Key::Backspace => CanvasKey::Backspace,
        egui::Key::Delete => CanvasKey::Delete,
        egui::Key::Escape => CanvasKey::Escape,
        egui::Key::Enter => CanvasKey::Enter,
        egui::Key::Tab => CanvasKey::Tab,
        egui::Key::PageUp => CanvasKey::PageUp,
        egui::Key::PageDown => CanvasKey::PageDown,
        egui::Key::Home => CanvasKey::Home,
        _ => return None,
    })
}

/// Actions collected from the toolbar for deferred execution
#[derive(Default)]
struct ToolbarActions {
    close_subpatch: bool,
    toggle_lock: bool,
    grid: Option<bool>,
    presentation: Option<bool>,
    undo: bool,
    redo: bool,
    save: bool,
    dsp: Option<bool>,
}

impl eframe::App for CanvasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply theme on first frame
        if !self.theme_applied {
            theme::apply_theme(ctx);
            self.theme_applied = true;
        }

        self.drain_engine_events();
        self.canvas.run_deferred();
        self.export_clipboard(ctx);

        let toolbar_actions = egui::TopBottomPanel::top("toolbar")
            .frame(
                egui::Frame::none()
                    .fill(theme::background::PANEL)
                    .inner_margin(egui::Margin::symmetric(0.0, 6.0)),
            )
            .show(ctx, |ui| self.draw_toolbar(ui))
            .inner;

        egui::TopBottomPanel::bottom("status_bar")
            .frame(
                egui::Frame::none()
                    .fill(theme::background::PANEL)
                    .inner_margin(egui::Margin::symmetric(0.0, 4.0)),
            )
            .show(ctx, |ui| self.draw_status_bar(ui));

        self.draw_sidebar(ctx);

        let canvas_rect = egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (response, painter) =
                    ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
                self.canvas.set_view_size(response.rect.size());
                self.handle_input(ctx, &response);
                self.draw_canvas(&painter, response.rect);
                response.rect
            })
            .inner;

        if let Some(item) = self.draw_context_menu(ctx, canvas_rect.min) {
            self.canvas.choose_menu_item(item);
        }
        self.draw_editor(ctx, canvas_rect.min);
        self.handle_requests();

        // Handle deferred actions (to avoid borrow checker issues)
        if toolbar_actions.close_subpatch {
            self.close_subpatch();
        }
        if toolbar_actions.toggle_lock {
            self.flags.set_locked(!self.flags.get().locked);
        }
        if let Some(grid) = toolbar_actions.grid {
            self.flags.set_grid_enabled(grid);
        }
        if let Some(presentation) = toolbar_actions.presentation {
            self.flags.set_presentation_mode(presentation);
        }
        if toolbar_actions.undo {
            self.canvas.undo();
        }
        if toolbar_actions.redo {
            self.canvas.redo();
        }
        if toolbar_actions.save {
            self.save();
        }
        if let Some(running) = toolbar_actions.dsp {
            self.set_dsp(running);
        }

        // Engine events arrive without input, keep polling
        ctx.request_repaint_after(Duration::from_millis(30));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_keys_map_to_canvas_keys() {
        assert_eq!(canvas_key(egui::Key::ArrowLeft), Some(CanvasKey::Left));
        assert_eq!(canvas_key(egui::Key::Delete), Some(CanvasKey::Delete));
        assert_eq!(canvas_key(egui::Key::F1), None);
    }

    #[test]
    fn test_extra_buttons_are_ignored() {
        assert_eq!(pointer_button(egui::PointerButton::Primary), Some(PointerButton::Primary));
        assert_eq!(pointer_button(egui::PointerButton::Extra1), None);
    }

    #[test]
    fn test_widget_faces() {
        assert!(widget_has_face(&GuiWidget::Bang { latched: false }));
        assert!(!widget_has_face(&GuiWidget::Message));
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(step_label("Undo", Some("typing")), "Undo typing");
        assert_eq!(step_label("Redo", None), "Redo");
    }
}
