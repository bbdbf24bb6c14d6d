use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde::Serialize;

use crate::error::KioskError;
use crate::events::{StatusKind, UiEmitter, UiEvent};
use crate::timer::{ActiveTimers, TimerSlot};

use super::catalog::StoryCatalog;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::story";

use crate::{log_debug, log_info};

/// Read-only view of the passage on screen, for tagging samples at capture
/// time.
#[derive(Clone, Debug)]
pub struct StoryCursor {
    index: Arc<AtomicUsize>,
}

impl StoryCursor {
    pub fn current(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoryProgressState {
    pub current_index: usize,
    pub phase_entered_at_ms: i64,
}

pub struct StoryController {
    catalog: Arc<StoryCatalog>,
    index: Arc<AtomicUsize>,
    next_visible: Arc<AtomicBool>,
    entered_at_ms: i64,
    reveal_after: Duration,
    reveal: TimerSlot,
    ui: UiEmitter,
}

impl StoryController {
    pub fn new(
        catalog: Arc<StoryCatalog>,
        reveal_after: Duration,
        ui: UiEmitter,
        timers: ActiveTimers,
    ) -> Self {
        Self {
            catalog,
            index: Arc::new(AtomicUsize::new(0)),
            next_visible: Arc::new(AtomicBool::new(false)),
            entered_at_ms: 0,
            reveal_after,
            reveal: TimerSlot::new("story-reveal", timers),
            ui,
        }
    }

    pub fn cursor(&self) -> StoryCursor {
        StoryCursor {
            index: Arc::clone(&self.index),
        }
    }

    /// Shows the first passage and starts its reveal timer.
    pub fn enter(&mut self) {
        self.index.store(0, Ordering::SeqCst);
        self.entered_at_ms = Utc::now().timestamp_millis();
        log_info!("reading started with {} passages", self.catalog.len());
        self.show_current();
    }

    pub fn current_index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> StoryProgressState {
        StoryProgressState {
            current_index: self.current_index(),
            phase_entered_at_ms: self.entered_at_ms,
        }
    }

    pub fn next_visible(&self) -> bool {
        self.next_visible.load(Ordering::SeqCst)
    }

    /// Moves to the next passage and returns its index. At the last passage
    /// this announces completion and asks for the child's details instead;
    /// the call is rejected every time.
    pub fn advance(&mut self) -> Result<usize, KioskError> {
        let current = self.current_index();
        if current >= self.catalog.last_index() {
            self.reveal.cancel();
            self.set_next_visible(false);
            self.ui.status(StatusKind::Success, "All passages complete!");
            self.ui.emit(UiEvent::AllPassagesComplete);
            self.ui.emit(UiEvent::ChildInfoPrompt);
            return Err(KioskError::NoMorePassages(current));
        }

        let next = current + 1;
        self.index.store(next, Ordering::SeqCst);
        self.entered_at_ms = Utc::now().timestamp_millis();
        log_debug!("advanced to passage {next}");
        self.show_current();
        self.ui.status(
            StatusKind::Info,
            format!("Now read passage {} of {}", next + 1, self.catalog.len()),
        );
        Ok(next)
    }

    /// The reader signalled they finished early; reveal the control now.
    pub fn hint_complete(&mut self) {
        self.reveal.cancel();
        self.set_next_visible(true);
    }

    pub fn stop(&mut self) {
        self.reveal.cancel();
    }

    fn show_current(&mut self) {
        let index = self.current_index();
        if let Some(story) = self.catalog.get(index) {
            self.ui.emit(UiEvent::PassageDisplayed {
                index,
                total: self.catalog.len(),
                title: story.title.clone(),
                body: story.body.clone(),
            });
        }

        self.set_next_visible(false);
        if index < self.catalog.last_index() {
            let flag = Arc::clone(&self.next_visible);
            let ui = self.ui.clone();
            self.reveal.after(self.reveal_after, move || {
                flag.store(true, Ordering::SeqCst);
                ui.emit(UiEvent::NextPassageControl { visible: true });
                ui.status(StatusKind::Info, "Move on to the next passage!");
            });
        } else {
            self.reveal.cancel();
        }
    }

    fn set_next_visible(&self, visible: bool) {
        self.next_visible.store(visible, Ordering::SeqCst);
        self.ui.emit(UiEvent::NextPassageControl { visible });
    }
}
