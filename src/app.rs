use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions};
use log::{error, info, warn};
use std::time::Duration;

use crate::config::UserConfig;
use crate::images::{self, FolderImageStore, ImageStore};
use crate::ledger::CsvLedger;
use crate::quiz::{wiki_link, Deck, Draw, GameSummary, GuessResult, QuizSession};
use crate::ui::{Progress, QuizAction, QuizUI};

#[derive(Debug)]
enum Screen {
    Start,
    Playing,
    Registering,
    Message {
        title: String,
        text: String,
        link: Option<String>,
    },
    GameOver(GameSummary),
}

struct Game {
    session: QuizSession,
    images: FolderImageStore,
    flag: Option<TextureHandle>,
}

pub struct FlagQuizApp {
    config: UserConfig,
    ui: QuizUI,
    game: Option<Game>,
    screen: Screen,
    status: Option<String>,
}

impl FlagQuizApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self {
            config: UserConfig::load(),
            ui: QuizUI::default(),
            game: None,
            screen: Screen::Start,
            status: None,
        }
    }

    fn start_game(&mut self, ctx: &egui::Context) -> Result<(), String> {
        let images = FolderImageStore::open(&self.config.flags_folder).map_err(|e| {
            format!(
                "Failed to open flags folder {}: {}",
                self.config.flags_folder.display(),
                e
            )
        })?;
        let ledger = CsvLedger::new(&self.config.answers_path);
        let deck = Deck::load(&ledger, &images).map_err(|e| {
            format!(
                "Failed to load answers from {}: {}",
                ledger.path().display(),
                e
            )
        })?;

        info!(
            "Starting game with {} flags from {}",
            deck.total(),
            self.config.flags_folder.display()
        );
        self.status = None;
        self.game = Some(Game {
            session: QuizSession::new(deck, Box::new(ledger)),
            images,
            flag: None,
        });
        self.ui = QuizUI::default();
        self.check_saved();
        self.advance(ctx);
        Ok(())
    }

    fn advance(&mut self, ctx: &egui::Context) {
        let Some(game) = &mut self.game else {
            self.screen = Screen::Start;
            return;
        };

        match game.session.draw_next() {
            Draw::Flag(flag) => {
                let id = flag.id().to_string();
                game.flag = load_flag_texture(ctx, &game.images, &id);
                self.ui.focus_entry = true;
                self.screen = Screen::Playing;
            }
            Draw::Finished(summary) => {
                game.flag = None;
                self.config.record_score(summary.score, summary.total);
                if let Err(e) = self.config.save() {
                    warn!("Failed to save user config: {}", e);
                }
                self.screen = Screen::GameOver(summary);
            }
        }
        self.check_saved();
    }

    fn check_saved(&mut self) {
        if let Some(e) = self.game.as_mut().and_then(|game| game.session.take_save_error()) {
            self.status = Some(format!("Could not save answers: {}", e));
        }
    }

    fn apply(&mut self, result: GuessResult, guess: &str, ctx: &egui::Context) {
        let message = |title: &str, text: String, link: Option<String>| Screen::Message {
            title: title.to_string(),
            text,
            link,
        };

        match result {
            GuessResult::Correct => {
                self.advance(ctx);
                return;
            }
            GuessResult::NeedsDecision(_) => self.screen = Screen::Registering,
            GuessResult::Wrong { correct_answer } => {
                self.screen = message(
                    "Result",
                    format!("Wrong! The correct answer was: {}", correct_answer),
                    Some(wiki_link(&correct_answer)),
                );
            }
            GuessResult::Registered => {
                self.screen = message(
                    "Answer Registered",
                    "A new answer has been registered! You receive 1 point.".to_string(),
                    None,
                );
            }
            GuessResult::AlreadyKnown => {
                self.screen = message(
                    "Info",
                    format!("'{}' is already a valid answer.", guess),
                    None,
                );
            }
        }
        self.check_saved();
    }

    fn handle(&mut self, action: QuizAction, ctx: &egui::Context) {
        match action {
            QuizAction::None => {}
            QuizAction::StartGame | QuizAction::PlayAgain => {
                if let Err(e) = self.start_game(ctx) {
                    error!("{}", e);
                    self.status = Some(e);
                    self.game = None;
                    self.screen = Screen::Start;
                }
            }
            QuizAction::SubmitGuess(guess) => {
                let Some(game) = &mut self.game else { return };
                match game.session.submit_guess(&guess) {
                    Ok(result) => self.apply(result, &guess, ctx),
                    Err(e) => warn!("Ignoring guess '{}': {}", guess, e),
                }
            }
            QuizAction::AcceptRegistration | QuizAction::DeclineRegistration => {
                let Some(game) = &mut self.game else { return };
                let guess = game.session.pending_guess().unwrap_or_default().to_string();
                let accept = action == QuizAction::AcceptRegistration;
                match game.session.resolve_registration(accept, &guess) {
                    Ok(result) => self.apply(result, &guess, ctx),
                    Err(e) => warn!("Ignoring registration decision: {}", e),
                }
            }
            QuizAction::Dismiss => self.advance(ctx),
            QuizAction::ReturnToStart => {
                self.game = None;
                self.screen = Screen::Start;
            }
        }
    }
}

fn load_flag_texture(ctx: &egui::Context, store: &FolderImageStore, id: &str) -> Option<TextureHandle> {
    let decoded = store.load(id).and_then(|bytes| images::decode(&bytes));
    match decoded {
        Ok(img) => {
            let size = [img.width as usize, img.height as usize];
            let image = ColorImage::from_rgba_unmultiplied(size, &img.rgba);
            Some(ctx.load_texture("flag", image, TextureOptions::LINEAR))
        }
        Err(e) => {
            warn!("Failed to load image for {}: {}", id, e);
            None
        }
    }
}

impl eframe::App for FlagQuizApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Dialogs react to the screen as it was when the frame began, so the
        // key press that opened one cannot also close it.
        let dialog_action = match &self.screen {
            Screen::Registering => {
                let guess = self
                    .game
                    .as_ref()
                    .and_then(|game| game.session.pending_guess())
                    .unwrap_or_default();
                let flag_id = self
                    .game
                    .as_ref()
                    .and_then(|game| game.session.current_flag())
                    .map(|flag| flag.id())
                    .unwrap_or_default();
                self.ui.show_register_dialog(ctx, guess, flag_id)
            }
            Screen::Message { title, text, link } => {
                self.ui.show_message(ctx, title, text, link.as_deref())
            }
            _ => QuizAction::None,
        };

        let panel_action = egui::CentralPanel::default()
            .show(ctx, |ui| match &self.screen {
                Screen::Start => self.ui.show_start(ui, &mut self.config, self.status.as_deref()),
                Screen::GameOver(summary) => {
                    self.ui
                        .show_game_over(ui, summary, self.status.as_deref())
                }
                Screen::Playing | Screen::Registering | Screen::Message { .. } => {
                    let Some(game) = &self.game else {
                        return QuizAction::ReturnToStart;
                    };
                    if !matches!(self.screen, Screen::Playing) {
                        ui.set_enabled(false);
                    }
                    let progress = Progress {
                        score: game.session.score(),
                        question: game.session.questions_asked(),
                        total: game.session.total_flags(),
                        elapsed: game.session.elapsed(),
                    };
                    if let Some(status) = &self.status {
                        ui.colored_label(egui::Color32::RED, status.as_str());
                    }
                    self.ui.show_question(ui, game.flag.as_ref(), &progress, |guess| {
                        game.session.would_match(guess)
                    })
                }
            })
            .inner;

        self.handle(dialog_action, ctx);
        self.handle(panel_action, ctx);

        if matches!(self.screen, Screen::Playing) {
            ctx.request_repaint_after(Duration::from_secs(1));
        }
    }
}
