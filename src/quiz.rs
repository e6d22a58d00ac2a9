use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::error::{LedgerError, QuizError};
use crate::images::ImageStore;
use crate::ledger::{AnswerLedger, Answers};

/// A flag and the answers that count as naming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagEntry {
    id: String,
    accepted: BTreeSet<String>,
}

impl FlagEntry {
    pub fn new(id: impl Into<String>, accepted: BTreeSet<String>) -> Self {
        Self {
            id: id.into(),
            accepted,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn accepted(&self) -> &BTreeSet<String> {
        &self.accepted
    }

    /// Case-insensitive, whitespace-trimmed comparison against the id and
    /// every stored answer. Blank guesses never match.
    pub fn matches(&self, guess: &str) -> bool {
        let guess = guess.trim();
        if guess.is_empty() {
            return false;
        }
        let guess = guess.to_lowercase();
        std::iter::once(self.id.as_str())
            .chain(self.accepted.iter().map(String::as_str))
            .any(|answer| answer.trim().to_lowercase() == guess)
    }
}

/// The master answers table plus the flags still to be asked.
///
/// Playable flags live in an arena; answering one marks its slot removed
/// instead of re-keying a map.
#[derive(Debug)]
pub struct Deck {
    entries: Vec<FlagEntry>,
    removed: Vec<bool>,
    remaining: usize,
    master: Answers,
    seeded: usize,
}

impl Deck {
    /// Merges image ids missing from the ledger into `master` (each with only
    /// its own id as answer) and keeps as playable every id that has an image.
    pub fn build(mut master: Answers, image_ids: &BTreeSet<String>) -> Self {
        let mut seeded = 0;
        for id in image_ids {
            if !master.contains_key(id) {
                master.insert(id.clone(), BTreeSet::from([id.clone()]));
                seeded += 1;
            }
        }

        let mut entries = Vec::with_capacity(image_ids.len());
        for (id, answers) in &master {
            if image_ids.contains(id) {
                entries.push(FlagEntry::new(id.clone(), answers.clone()));
            } else {
                warn!("No image for flag '{}', leaving it out of the deck", id);
            }
        }

        info!(
            "Deck ready: {} playable flags, {} ledger rows, {} newly discovered",
            entries.len(),
            master.len(),
            seeded
        );

        Self {
            removed: vec![false; entries.len()],
            remaining: entries.len(),
            entries,
            master,
            seeded,
        }
    }

    pub fn load(ledger: &dyn AnswerLedger, images: &dyn ImageStore) -> Result<Self, LedgerError> {
        Ok(Self::build(ledger.load_all()?, &images.list_ids()))
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn remaining_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .zip(&self.removed)
            .filter(|(_, removed)| !**removed)
            .map(|(entry, _)| entry.id())
    }

    pub fn master(&self) -> &Answers {
        &self.master
    }

    /// Number of ids added to `master` because only an image existed for them.
    pub fn seeded(&self) -> usize {
        self.seeded
    }

    fn remove(&mut self, index: usize) {
        if !self.removed[index] {
            self.removed[index] = true;
            self.remaining -= 1;
        }
    }

    fn knows(&self, index: usize, answer: &str) -> bool {
        let id = self.entries[index].id();
        id == answer
            || self.entries[index].accepted.contains(answer)
            || self.master.get(id).map_or(false, |set| set.contains(answer))
    }

    fn register(&mut self, index: usize, answer: &str) {
        let entry = &mut self.entries[index];
        entry.accepted.insert(answer.to_string());
        self.master
            .entry(entry.id.clone())
            .or_default()
            .insert(answer.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    pub score: u32,
    pub total: u32,
    pub questions_asked: u32,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum Draw<'a> {
    Flag(&'a FlagEntry),
    Finished(GameSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessResult {
    Correct,
    /// The guess missed but may be registered as an alternative answer.
    NeedsDecision(String),
    Wrong { correct_answer: String },
    Registered,
    AlreadyKnown,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Presented(usize),
    AwaitingDecision { index: usize, guess: String },
    Finished(GameSummary),
}

/// One play-through of a deck.
pub struct QuizSession {
    deck: Deck,
    ledger: Box<dyn AnswerLedger>,
    queue: Vec<usize>,
    phase: Phase,
    score: u32,
    questions_asked: u32,
    started: Instant,
    save_error: Option<LedgerError>,
}

impl QuizSession {
    pub fn new(deck: Deck, ledger: Box<dyn AnswerLedger>) -> Self {
        Self::with_rng(deck, ledger, &mut thread_rng())
    }

    /// Starts a session whose question order is fixed by `rng`.
    pub fn with_rng<R: Rng + ?Sized>(deck: Deck, ledger: Box<dyn AnswerLedger>, rng: &mut R) -> Self {
        let mut queue: Vec<usize> = (0..deck.total()).collect();
        queue.shuffle(rng);

        let mut session = Self {
            deck,
            ledger,
            queue,
            phase: Phase::Idle,
            score: 0,
            questions_asked: 0,
            started: Instant::now(),
            save_error: None,
        };
        if session.deck.seeded() > 0 {
            session.persist();
        }
        session
    }

    /// Presents the next flag, or reports the final result once every flag
    /// has been resolved. An unresolved current flag is returned again.
    pub fn draw_next(&mut self) -> Draw<'_> {
        let index = match self.phase {
            Phase::Finished(summary) => return Draw::Finished(summary),
            Phase::Presented(index) | Phase::AwaitingDecision { index, .. } => index,
            Phase::Idle => match self.queue.pop() {
                Some(index) => {
                    self.questions_asked += 1;
                    self.phase = Phase::Presented(index);
                    debug!(
                        "Question {}/{}: {}",
                        self.questions_asked,
                        self.total_flags(),
                        self.deck.entries[index].id()
                    );
                    index
                }
                None => return Draw::Finished(self.finish()),
            },
        };
        Draw::Flag(&self.deck.entries[index])
    }

    pub fn submit_guess(&mut self, raw: &str) -> Result<GuessResult, QuizError> {
        let index = match self.phase {
            Phase::Presented(index) => index,
            Phase::AwaitingDecision { .. } => return Err(QuizError::DecisionPending),
            Phase::Idle => return Err(QuizError::NoCurrentFlag),
            Phase::Finished(_) => return Err(QuizError::Finished),
        };

        let guess = raw.trim();
        if self.deck.entries[index].matches(guess) {
            self.score += 1;
            self.resolve(index);
            return Ok(GuessResult::Correct);
        }

        if guess.is_empty() {
            let correct_answer = self.deck.entries[index].id().to_string();
            self.resolve(index);
            return Ok(GuessResult::Wrong { correct_answer });
        }

        self.phase = Phase::AwaitingDecision {
            index,
            guess: guess.to_string(),
        };
        Ok(GuessResult::NeedsDecision(guess.to_string()))
    }

    /// Settles a `NeedsDecision` outcome. Accepting stores `raw` under the
    /// current flag, rewrites the ledger and awards a point.
    pub fn resolve_registration(&mut self, accept: bool, raw: &str) -> Result<GuessResult, QuizError> {
        let index = match self.phase {
            Phase::AwaitingDecision { index, .. } => index,
            Phase::Finished(_) => return Err(QuizError::Finished),
            _ => return Err(QuizError::NoPendingDecision),
        };

        let id = self.deck.entries[index].id().to_string();
        let answer = raw.trim();
        if !accept || answer.is_empty() {
            self.resolve(index);
            return Ok(GuessResult::Wrong { correct_answer: id });
        }

        if self.deck.knows(index, answer) {
            info!("'{}' is already an accepted answer for {}", answer, id);
            self.resolve(index);
            return Ok(GuessResult::AlreadyKnown);
        }

        self.deck.register(index, answer);
        info!("Registered '{}' as an answer for {}", answer, id);
        self.persist();
        self.score += 1;
        self.resolve(index);
        Ok(GuessResult::Registered)
    }

    /// True when `raw` would be scored correct for the presented flag.
    pub fn would_match(&self, raw: &str) -> bool {
        match self.phase {
            Phase::Presented(index) => self.deck.entries[index].matches(raw),
            _ => false,
        }
    }

    pub fn current_flag(&self) -> Option<&FlagEntry> {
        match &self.phase {
            Phase::Presented(index) | Phase::AwaitingDecision { index, .. } => {
                Some(&self.deck.entries[*index])
            }
            _ => None,
        }
    }

    pub fn pending_guess(&self) -> Option<&str> {
        match &self.phase {
            Phase::AwaitingDecision { guess, .. } => Some(guess),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn questions_asked(&self) -> u32 {
        self.questions_asked
    }

    pub fn total_flags(&self) -> u32 {
        self.deck.total() as u32
    }

    pub fn remaining(&self) -> usize {
        self.deck.remaining()
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn elapsed(&self) -> Duration {
        match self.phase {
            Phase::Finished(summary) => summary.elapsed,
            _ => self.started.elapsed(),
        }
    }

    /// The most recent ledger write failure, if it has not been taken yet.
    pub fn take_save_error(&mut self) -> Option<LedgerError> {
        self.save_error.take()
    }

    fn resolve(&mut self, index: usize) {
        self.deck.remove(index);
        self.phase = Phase::Idle;
    }

    fn finish(&mut self) -> GameSummary {
        let summary = GameSummary {
            score: self.score,
            total: self.total_flags(),
            questions_asked: self.questions_asked,
            elapsed: self.started.elapsed(),
        };
        info!(
            "Game over: {}/{} in {}",
            summary.score,
            summary.total,
            format_elapsed(summary.elapsed)
        );
        self.persist();
        self.phase = Phase::Finished(summary);
        summary
    }

    fn persist(&mut self) {
        match self.ledger.save_all(self.deck.master()) {
            Ok(()) => self.save_error = None,
            Err(e) => {
                error!("Failed to save answers: {}", e);
                self.save_error = Some(e);
            }
        }
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn wiki_link(id: &str) -> String {
    format!("https://en.wikipedia.org/wiki/{}", id.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{answers, MemoryLedger};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn start(rows: &[(&str, &[&str])], seed: u64) -> (QuizSession, MemoryLedger) {
        let table = answers(rows);
        let image_ids: BTreeSet<String> = table.keys().cloned().collect();
        let ledger = MemoryLedger::default();
        *ledger.stored.borrow_mut() = table.clone();
        let deck = Deck::build(table, &image_ids);
        let session = QuizSession::with_rng(
            deck,
            Box::new(ledger.clone()),
            &mut StdRng::seed_from_u64(seed),
        );
        (session, ledger)
    }

    /// Plays the deck to the end, declining every registration.
    fn play_all(session: &mut QuizSession, guess: impl Fn(&str) -> String) -> Vec<String> {
        let mut seen = Vec::new();
        let mut unique = HashSet::new();
        loop {
            let id = match session.draw_next() {
                Draw::Flag(flag) => flag.id().to_string(),
                Draw::Finished(_) => break,
            };
            assert!(unique.insert(id.clone()), "{} asked twice", id);
            let before = session.remaining();
            if let GuessResult::NeedsDecision(raw) = session.submit_guess(&guess(&id)).unwrap() {
                session.resolve_registration(false, &raw).unwrap();
            }
            assert_eq!(session.remaining(), before - 1);
            seen.push(id);
        }
        seen
    }

    fn present(session: &mut QuizSession) -> String {
        match session.draw_next() {
            Draw::Flag(flag) => flag.id().to_string(),
            Draw::Finished(summary) => panic!("unexpected game over: {:?}", summary),
        }
    }

    #[test]
    fn matching_is_trimmed_and_case_insensitive() {
        let flag = FlagEntry::new("France", BTreeSet::new());
        assert!(flag.matches(" France "));
        assert!(flag.matches("FRANCE"));
        assert!(!flag.matches("Frankreich"));

        let japan = FlagEntry::new("Japan", ids(&["Nippon"]));
        assert!(japan.matches("nippon"));
        assert!(japan.matches("japan"));
    }

    #[test]
    fn blank_guess_never_matches() {
        let flag = FlagEntry::new("Oddity", ids(&["", "  "]));
        assert!(!flag.matches(""));
        assert!(!flag.matches("   "));
    }

    #[test]
    fn deck_merges_images_and_skips_missing_ones() {
        let ledger = answers(&[("Japan", &["Nippon"]), ("Atlantis", &["Atlantida"])]);
        let deck = Deck::build(ledger, &ids(&["Japan", "France"]));

        assert_eq!(deck.total(), 2);
        assert_eq!(deck.remaining(), 2);
        assert_eq!(deck.seeded(), 1);
        assert_eq!(deck.master()["France"], ids(&["France"]));
        assert!(deck.master().contains_key("Atlantis"));
        let playable: Vec<_> = deck.remaining_ids().collect();
        assert_eq!(playable, vec!["France", "Japan"]);
    }

    #[test]
    fn discovered_flags_are_saved_at_start() {
        let ledger = MemoryLedger::default();
        let deck = Deck::build(Answers::new(), &ids(&["Peru"]));
        let _session = QuizSession::new(deck, Box::new(ledger.clone()));

        assert_eq!(ledger.saves.get(), 1);
        assert_eq!(*ledger.stored.borrow(), answers(&[("Peru", &["Peru"])]));
    }

    #[test]
    fn japan_then_france_scenario() {
        let (mut session, _ledger) = start(&[("France", &["France"]), ("Japan", &["Japan", "Nippon"])], 7);
        assert_eq!(session.total_flags(), 2);

        for _ in 0..2 {
            match present(&mut session).as_str() {
                "Japan" => {
                    assert_eq!(session.submit_guess("Nippon"), Ok(GuessResult::Correct));
                    assert!(!session.deck().remaining_ids().any(|id| id == "Japan"));
                }
                "France" => {
                    assert_eq!(
                        session.submit_guess(""),
                        Ok(GuessResult::Wrong {
                            correct_answer: "France".to_string()
                        })
                    );
                    assert!(!session.deck().remaining_ids().any(|id| id == "France"));
                }
                other => panic!("unexpected flag {}", other),
            }
        }

        assert_eq!(session.remaining(), 0);
        match session.draw_next() {
            Draw::Finished(summary) => {
                assert_eq!((summary.score, summary.total, summary.questions_asked), (1, 2, 2));
            }
            Draw::Flag(flag) => panic!("deck should be empty, got {}", flag.id()),
        }
        assert!(session.is_finished());
        assert_eq!(session.submit_guess("France"), Err(QuizError::Finished));
    }

    #[test]
    fn registering_an_alternative_answer() {
        let (mut session, ledger) = start(&[("Japan", &["Japan", "Nippon"])], 1);
        assert_eq!(present(&mut session), "Japan");

        assert_eq!(
            session.submit_guess(" Japon "),
            Ok(GuessResult::NeedsDecision("Japon".to_string()))
        );
        assert_eq!(session.score(), 0);
        assert_eq!(session.remaining(), 1);
        assert_eq!(session.pending_guess(), Some("Japon"));
        assert_eq!(session.submit_guess("Japan"), Err(QuizError::DecisionPending));

        assert_eq!(session.resolve_registration(true, "Japon"), Ok(GuessResult::Registered));
        assert_eq!(session.score(), 1);
        assert_eq!(session.remaining(), 0);
        assert!(session.deck().master()["Japan"].contains("Japon"));
        assert!(ledger.stored.borrow()["Japan"].contains("Japon"));
        assert!(session.take_save_error().is_none());
    }

    #[test]
    fn declining_registration_is_wrong() {
        let (mut session, ledger) = start(&[("Chad", &[])], 3);
        present(&mut session);

        session.submit_guess("Romania").unwrap();
        assert_eq!(
            session.resolve_registration(false, "Romania"),
            Ok(GuessResult::Wrong {
                correct_answer: "Chad".to_string()
            })
        );
        assert_eq!(session.score(), 0);
        assert_eq!(session.remaining(), 0);
        assert_eq!(ledger.saves.get(), 0);
    }

    #[test]
    fn known_answer_is_not_registered_twice() {
        let (mut session, ledger) = start(&[("Japan", &["Nippon"])], 5);
        present(&mut session);

        session.submit_guess("Nipon").unwrap();
        assert_eq!(session.resolve_registration(true, "Nippon"), Ok(GuessResult::AlreadyKnown));
        assert_eq!(session.score(), 0);
        assert_eq!(session.remaining(), 0);
        assert_eq!(session.deck().master()["Japan"], ids(&["Nippon"]));
        assert_eq!(ledger.saves.get(), 0);
    }

    #[test]
    fn registering_the_flag_id_is_already_known() {
        let (mut session, ledger) = start(&[("Japan", &["Nippon"])], 6);
        present(&mut session);

        session.submit_guess("Japon").unwrap();
        assert_eq!(session.resolve_registration(true, "Japan"), Ok(GuessResult::AlreadyKnown));
        assert_eq!(session.score(), 0);
        assert_eq!(session.remaining(), 0);
        assert_eq!(session.deck().master()["Japan"], ids(&["Nippon"]));
        assert_eq!(ledger.saves.get(), 0);
    }

    #[test]
    fn registration_requires_a_pending_decision() {
        let (mut session, _ledger) = start(&[("Peru", &[])], 2);
        assert_eq!(session.submit_guess("Peru"), Err(QuizError::NoCurrentFlag));
        assert_eq!(
            session.resolve_registration(true, "Peru"),
            Err(QuizError::NoPendingDecision)
        );

        present(&mut session);
        assert_eq!(
            session.resolve_registration(true, "Peru"),
            Err(QuizError::NoPendingDecision)
        );
    }

    #[test]
    fn save_failure_does_not_block_play() {
        let (mut session, ledger) = start(&[("Chad", &[]), ("Peru", &[])], 11);
        ledger.fail_saves.set(true);

        let first = present(&mut session);
        session.submit_guess("first guess").unwrap();
        assert_eq!(session.resolve_registration(true, "first guess"), Ok(GuessResult::Registered));
        assert_eq!(session.score(), 1);
        assert!(matches!(session.take_save_error(), Some(LedgerError::Io(_))));
        assert!(session.take_save_error().is_none());

        ledger.fail_saves.set(false);
        let second = present(&mut session);
        session.submit_guess("second guess").unwrap();
        assert_eq!(session.resolve_registration(true, "second guess"), Ok(GuessResult::Registered));

        let stored = ledger.stored.borrow();
        assert!(stored[&first].contains("first guess"));
        assert!(stored[&second].contains("second guess"));
    }

    #[test]
    fn drawing_again_keeps_the_current_flag() {
        let (mut session, _ledger) = start(&[("Chad", &[]), ("Peru", &[]), ("Fiji", &[])], 9);
        let first = present(&mut session);
        let again = present(&mut session);
        assert_eq!(first, again);
        assert_eq!(session.questions_asked(), 1);
        assert_eq!(session.remaining(), 3);
    }

    #[test]
    fn every_flag_is_asked_once() {
        let rows: &[(&str, &[&str])] = &[
            ("Chad", &[]),
            ("Peru", &[]),
            ("Fiji", &[]),
            ("Laos", &[]),
            ("Mali", &[]),
        ];
        let (mut session, _ledger) = start(rows, 42);

        let asked = play_all(&mut session, |id| {
            if id != "Mali" {
                id.to_uppercase()
            } else {
                "nope".to_string()
            }
        });

        assert_eq!(asked.len(), 5);
        assert_eq!(session.questions_asked(), 5);
        assert_eq!(session.score(), 4);
        assert!(session.is_finished());
    }

    #[test]
    fn seeded_sessions_share_an_order() {
        let rows: &[(&str, &[&str])] = &[("Chad", &[]), ("Peru", &[]), ("Fiji", &[]), ("Laos", &[])];
        let (mut a, _) = start(rows, 1234);
        let (mut b, _) = start(rows, 1234);

        let order_a = play_all(&mut a, |_| String::new());
        let order_b = play_all(&mut b, |_| String::new());
        assert_eq!(order_a, order_b);
        assert_eq!(a.score(), 0);
    }

    #[test]
    fn empty_deck_finishes_immediately() {
        let (mut session, ledger) = start(&[], 0);
        match session.draw_next() {
            Draw::Finished(summary) => assert_eq!((summary.score, summary.total), (0, 0)),
            Draw::Flag(_) => panic!("empty deck produced a flag"),
        }
        assert_eq!(ledger.saves.get(), 1);
    }

    #[test]
    fn would_match_only_for_presented_flag() {
        let (mut session, _ledger) = start(&[("Japan", &["Nippon"])], 4);
        assert!(!session.would_match("Japan"));
        present(&mut session);
        assert!(session.would_match("NIPPON"));
        assert!(!session.would_match(""));
        assert!(!session.would_match("Nipp"));
    }

    #[test]
    fn elapsed_is_formatted_as_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "01:15");
        assert_eq!(format_elapsed(Duration::from_secs(3599)), "59:59");
    }

    #[test]
    fn wiki_link_uses_underscores() {
        assert_eq!(
            wiki_link("Ivory Coast"),
            "https://en.wikipedia.org/wiki/Ivory_Coast"
        );
    }
}
