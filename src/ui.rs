use chrono::TimeZone;
use egui::{Align2, Color32, Context, Key, RichText, TextureHandle, Ui};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::UserConfig;
use crate::quiz::{format_elapsed, GameSummary};

const FLAG_SIZE: [f32; 2] = [300.0, 150.0];

pub struct QuizUI {
    pub current_answer: String,
    pub focus_entry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizAction {
    None,
    StartGame,
    SubmitGuess(String),
    AcceptRegistration,
    DeclineRegistration,
    Dismiss,
    PlayAgain,
    ReturnToStart,
}

/// Counters shown under the flag.
pub struct Progress {
    pub score: u32,
    pub question: u32,
    pub total: u32,
    pub elapsed: Duration,
}

impl Default for QuizUI {
    fn default() -> Self {
        Self {
            current_answer: String::new(),
            focus_entry: true,
        }
    }
}

impl QuizUI {
    pub fn show_start(&mut self, ui: &mut Ui, config: &mut UserConfig, status: Option<&str>) -> QuizAction {
        let mut action = QuizAction::None;

        ui.heading("Flag Guesser");
        ui.separator();

        ui.label("Flags Folder:");
        ui.horizontal(|ui| {
            ui.label(config.flags_folder.display().to_string());
            if ui.button("Browse").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .set_directory(existing_dir(&config.flags_folder))
                    .pick_folder()
                {
                    config.flags_folder = path;
                }
            }
        });

        ui.label("Answers File:");
        ui.horizontal(|ui| {
            ui.label(config.answers_path.display().to_string());
            if ui.button("Browse").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("csv", &["csv"])
                    .set_directory(existing_dir(&config.answers_path))
                    .save_file()
                {
                    config.answers_path = path;
                }
            }
        });

        if let Some(status) = status {
            ui.add_space(10.0);
            ui.label(RichText::new(status).color(Color32::RED));
        }

        ui.add_space(20.0);
        if ui.button("Start Game").clicked() {
            action = QuizAction::StartGame;
        }

        if !config.score_history.is_empty() {
            ui.add_space(20.0);
            ui.label("Recent Games:");
            ui.separator();
            for &(score, total, timestamp) in &config.score_history {
                ui.label(format!("{}  {}/{}", format_timestamp(timestamp), score, total));
            }
        }

        action
    }

    pub fn show_question(
        &mut self,
        ui: &mut Ui,
        flag: Option<&TextureHandle>,
        progress: &Progress,
        would_match: impl Fn(&str) -> bool,
    ) -> QuizAction {
        let mut action = QuizAction::None;

        ui.vertical_centered(|ui| {
            match flag {
                Some(texture) => {
                    ui.image(texture.id(), FLAG_SIZE);
                }
                None => {
                    ui.add_sized(FLAG_SIZE, egui::Label::new("(image unavailable)"));
                }
            }
            ui.add_space(10.0);

            let response = ui.add(
                egui::TextEdit::singleline(&mut self.current_answer).font(egui::TextStyle::Heading),
            );
            if self.focus_entry {
                response.request_focus();
                self.focus_entry = false;
            }

            let entered = response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
            let auto = response.changed() && would_match(&self.current_answer);
            if ui.button("Submit Guess").clicked() || entered || auto {
                action = QuizAction::SubmitGuess(std::mem::take(&mut self.current_answer));
                self.focus_entry = true;
            }

            ui.add_space(10.0);
            ui.label(format!("Score: {}/{}", progress.score, progress.total));
            ui.label(format!("Question: {}/{}", progress.question, progress.total));
            ui.label(format!("Time Elapsed: {}", format_elapsed(progress.elapsed)));
        });

        action
    }

    pub fn show_register_dialog(&mut self, ctx: &Context, guess: &str, flag_id: &str) -> QuizAction {
        let mut action = QuizAction::None;

        dialog(ctx, "Register Alternative Answer", |ui| {
            ui.label(format!(
                "Would you like to register '{}' for {} as an alternative answer for this flag?",
                guess, flag_id
            ));
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                if ui.button("Yes").clicked() {
                    action = QuizAction::AcceptRegistration;
                }
                if ui.button("No").clicked() {
                    action = QuizAction::DeclineRegistration;
                }
            });
            if ui.input(|i| i.key_pressed(Key::Enter)) {
                action = QuizAction::DeclineRegistration;
            }
        });

        action
    }

    pub fn show_message(&mut self, ctx: &Context, title: &str, text: &str, link: Option<&str>) -> QuizAction {
        let mut action = QuizAction::None;

        dialog(ctx, title, |ui| {
            ui.label(text);
            ui.add_space(10.0);
            if ui.button("OK").clicked() || ui.input(|i| i.key_pressed(Key::Enter)) {
                action = QuizAction::Dismiss;
            }
            if let Some(url) = link {
                ui.hyperlink_to("Learn more on Wikipedia", url);
            }
        });

        action
    }

    pub fn show_game_over(&mut self, ui: &mut Ui, summary: &GameSummary, save_status: Option<&str>) -> QuizAction {
        let mut action = QuizAction::None;

        ui.heading("Game Over");
        ui.separator();

        let percentage = if summary.total == 0 {
            0.0
        } else {
            (summary.score as f32 / summary.total as f32) * 100.0
        };
        ui.label(
            RichText::new(format!(
                "Your final score is: {}/{} ({:.1}%)",
                summary.score, summary.total, percentage
            ))
            .size(18.0),
        );
        ui.label(format!("Time played for: {}", format_elapsed(summary.elapsed)));

        if let Some(status) = save_status {
            ui.label(RichText::new(status).color(Color32::RED));
        }

        ui.add_space(20.0);
        ui.horizontal(|ui| {
            if ui.button("Play Again").clicked() {
                action = QuizAction::PlayAgain;
            }
            if ui.button("Return to Start").clicked() {
                action = QuizAction::ReturnToStart;
            }
        });

        action
    }
}

fn dialog(ctx: &Context, title: &str, add_contents: impl FnOnce(&mut Ui)) {
    egui::Window::new(title)
        .collapsible(false)
        .resizable(false)
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, add_contents);
}

fn existing_dir(path: &std::path::Path) -> PathBuf {
    let dir = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(path)
    };
    if dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        dir.to_path_buf()
    }
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown date".to_string())
}
