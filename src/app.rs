use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{self, *};

use crate::chat::{bind_backend, ChatPipeline};
use crate::config::Config;
use crate::particles::ParticleOverlay;
use crate::stats::{StatsProvider, StatsSidebar};
use crate::sweep::SweepOverlay;
use crate::transcript::{LineKind, Transcript};

pub const APP_TITLE: &str = "KAISEL — The Haunted Terminal (Violet Spirit)";
const GREETING: &str = "Spirit Mode engaged. Violet currents flow.";
const HEADER_PERIOD: f32 = 1.4;
const GLOW_PERIOD:   f32 = 1.5;
const GLOW_PEAK:     f32 = 0.32;
const SIDEBAR_WIDTH: f32 = 220.0;
const INPUT_ROW_H:   f32 = 38.0;
const FOOTER_H:      f32 = 22.0;
const HEADER_FONT:   f32 = 34.0;
const HEADER_HEIGHT: f32 = 48.0;
const HEADER_GROW:   Vec2 = Vec2::new(8.0, 4.0);
const FRAME_TOP:     Color32 = Color32::from_rgb(4, 4, 24);
const FRAME_BOTTOM:  Color32 = Color32::from_rgb(7, 16, 42);

/// 0 at the ends of the period, 1 half way through.
pub fn pulse(t: f32, period: f32) -> f32 {
    if period <= 0.0 { return 0.0; }
    let phase = t.rem_euclid(period) / period;
    1.0 - (2.0 * phase - 1.0).abs()
}

pub fn header_opacity(t: f32) -> f32 { 0.6 + 0.4 * pulse(t, HEADER_PERIOD) }
/// How far the header box has grown past its resting size on each side.
pub fn header_grow(t: f32) -> Vec2 { HEADER_GROW * pulse(t, HEADER_PERIOD) }
pub fn header_font_size(t: f32) -> f32 {
    HEADER_FONT * (HEADER_HEIGHT + 2.0 * header_grow(t).y) / HEADER_HEIGHT
}
pub fn glow_strength(t: f32) -> f32 { GLOW_PEAK * pulse(t, GLOW_PERIOD) }

fn footer_status(pipeline: &ChatPipeline) -> String {
    let base = format!("Spirit Mode: active · {} · {} asked", pipeline.backend_name(), pipeline.dispatched());
    match pipeline.in_flight() {
        0 => base,
        n => format!("{base} ({n} in flight)"),
    }
}

pub struct HauntedTerminal {
    config:     Config,
    transcript: Transcript,
    pipeline:   ChatPipeline,
    particles:  ParticleOverlay,
    sweep:      SweepOverlay,
    sidebar:    StatsSidebar,
    input:      String,
    anim_t:     f32,
}

impl HauntedTerminal {
    pub fn new(cc: &eframe::CreationContext) -> Self {
        let mut style = (*cc.egui_ctx.style()).clone();
        style.visuals.window_rounding                 = Rounding::same(10.0);
        style.visuals.widgets.noninteractive.rounding = Rounding::same(6.0);
        style.visuals.widgets.inactive.rounding       = Rounding::same(6.0);
        style.visuals.widgets.hovered.rounding        = Rounding::same(6.0);
        style.visuals.widgets.active.rounding         = Rounding::same(6.0);
        style.visuals.panel_fill                      = Color32::from_rgb(6, 6, 18);
        style.visuals.extreme_bg_color                = Color32::from_rgba_unmultiplied(10, 12, 20, 230);
        style.visuals.selection.stroke                = Stroke::new(1.0, Color32::from_rgba_unmultiplied(120, 100, 255, 90));
        cc.egui_ctx.set_style(style);

        let config = Config::load();
        let mut pipeline = ChatPipeline::new(bind_backend(&config), config.reply_latency());
        let ctx = cc.egui_ctx.clone();
        pipeline.set_waker(Arc::new(move || ctx.request_repaint()));
        Self::with_parts(config, pipeline, StatsProvider::detect())
    }

    pub fn with_parts(config: Config, pipeline: ChatPipeline, stats: StatsProvider) -> Self {
        let now = Instant::now();
        let mut transcript = Transcript::new(config.scrollback_lines);
        transcript.push(LineKind::System, GREETING);
        Self {
            particles: ParticleOverlay::new(config.particle_count),
            sweep: SweepOverlay::new(now),
            sidebar: StatsSidebar::new(stats, config.stats_interval()),
            transcript, pipeline, input: String::new(), anim_t: 0.0, config,
        }
    }

    fn submit_input(&mut self) {
        let text = std::mem::take(&mut self.input);
        self.pipeline.submit(&text, &mut self.transcript);
    }

    fn line_color(kind: LineKind) -> Color32 {
        match kind {
            LineKind::User   => Color32::from_rgb(230, 233, 255),
            LineKind::Status => Color32::from_rgba_unmultiplied(200, 190, 255, 170),
            LineKind::Error  => Color32::from_rgb(255, 140, 170),
            LineKind::Reply | LineKind::System => Color32::from_rgb(207, 233, 255),
        }
    }

    fn draw_header(&self, ui: &mut Ui) {
        let alpha = (header_opacity(self.anim_t) * 255.0) as u8;
        // reserve the fully grown box so the layout below does not jitter
        let (rect, _) = ui.allocate_exact_size(
            vec2(ui.available_width(), HEADER_HEIGHT + 2.0 * HEADER_GROW.y),
            Sense::hover(),
        );
        ui.painter().text(
            rect.center(),
            Align2::CENTER_CENTER,
            "K A I S E L",
            FontId::monospace(header_font_size(self.anim_t)),
            Color32::from_rgba_unmultiplied(220, 214, 255, alpha),
        );
    }

    fn draw_terminal(&mut self, ui: &mut Ui, rect: Rect) {
        let painter = ui.painter_at(rect);
        let mut bg = Mesh::default();
        bg.colored_vertex(rect.left_top(), FRAME_TOP);
        bg.colored_vertex(rect.right_top(), FRAME_TOP);
        bg.colored_vertex(rect.right_bottom(), FRAME_BOTTOM);
        bg.colored_vertex(rect.left_bottom(), FRAME_BOTTOM);
        bg.add_triangle(0, 1, 2);
        bg.add_triangle(0, 2, 3);
        painter.add(bg);

        let glow = (glow_strength(self.anim_t) * 110.0) as u8;
        painter.rect_filled(rect, 8.0, Color32::from_rgba_unmultiplied(120, 80, 255, glow));
        painter.rect_stroke(rect, 8.0, Stroke::new(1.0, Color32::from_rgba_unmultiplied(170, 120, 240, 90)));

        let font = FontId::monospace(self.config.font_size);
        ui.allocate_ui_at_rect(rect.shrink(12.0), |ui| {
            egui::ScrollArea::vertical()
                .id_source("kaisel_transcript")
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for line in self.transcript.lines() {
                        ui.label(RichText::new(line.display()).font(font.clone()).color(Self::line_color(line.kind)))
                            .on_hover_text(line.at.format("%H:%M:%S").to_string());
                    }
                });
        });

        // overlays go on top of the transcript, above everything painted so far
        self.particles.resize(rect.width(), rect.height());
        self.particles.paint(&painter, rect);
        self.sweep.paint(&painter, rect);
    }

    fn draw_input_row(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            let send_w = 64.0;
            let resp = ui.add(
                egui::TextEdit::singleline(&mut self.input)
                    .hint_text("Ask KAISEL... or type 'help'")
                    .font(FontId::monospace(self.config.font_size))
                    .margin(vec2(8.0, 8.0))
                    .desired_width(ui.available_width() - send_w - ui.spacing().item_spacing.x),
            );
            let enter = resp.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
            let clicked = ui.add_sized([send_w, INPUT_ROW_H - 8.0], egui::Button::new("Send")).clicked();
            if enter || clicked {
                self.submit_input();
                resp.request_focus();
            }
        });
    }

    fn draw_sidebar(&self, ui: &mut Ui) {
        ui.add_space(10.0);
        ui.vertical_centered(|ui| {
            ui.label(RichText::new("SYSTEM").strong().color(Color32::from_rgb(233, 231, 255)));
        });
        ui.add_space(8.0);
        for label in self.sidebar.labels() {
            egui::Frame::none()
                .fill(Color32::from_rgba_unmultiplied(22, 17, 50, 180))
                .rounding(8.0)
                .inner_margin(Margin::same(10.0))
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.label(RichText::new(label).monospace().color(Color32::from_rgb(223, 232, 255)));
                });
            ui.add_space(8.0);
        }
        if !self.sidebar.is_live() {
            ui.label(RichText::new("simulated").size(10.0).color(Color32::from_gray(110)));
        }
    }
}

impl eframe::App for HauntedTerminal {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(16));

        let now = Instant::now();
        self.anim_t = ctx.input(|i| i.time) as f32;
        self.pipeline.drain(&mut self.transcript);
        self.particles.tick(now);
        self.sweep.advance(now);
        self.sidebar.poll(now);

        egui::SidePanel::right("kaisel_sidebar")
            .exact_width(SIDEBAR_WIDTH)
            .resizable(false)
            .frame(egui::Frame::none().fill(Color32::from_rgb(10, 8, 26)).inner_margin(Margin::same(10.0)))
            .show(ctx, |ui| self.draw_sidebar(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_rgb(6, 6, 18)).inner_margin(Margin::same(8.0)))
            .show(ctx, |ui| {
                self.draw_header(ui);
                ui.add_space(6.0);

                let avail = ui.available_rect_before_wrap();
                let bottom = (avail.max.y - INPUT_ROW_H - FOOTER_H).max(avail.min.y + 1.0);
                let term_rect = Rect::from_min_max(avail.min, pos2(avail.max.x, bottom));
                self.draw_terminal(ui, term_rect);
                ui.allocate_rect(term_rect, Sense::hover());

                ui.add_space(6.0);
                self.draw_input_row(ui);
                let status = footer_status(&self.pipeline);
                ui.label(RichText::new(status).color(Color32::from_rgba_unmultiplied(200, 190, 255, 217)));
            });
    }
}
