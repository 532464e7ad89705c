use crossterm::event::{self, Event as TerminalEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Input the main loop reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Key press (releases and repeats are dropped)
  Key(KeyEvent),
  /// Terminal was resized; the next draw picks up the new size
  Resize,
  /// Nothing happened within one tick; views poll their queries
  Tick,
}

fn translate(evt: TerminalEvent) -> Option<Event> {
  match evt {
    TerminalEvent::Key(key) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
    TerminalEvent::Resize(..) => Some(Event::Resize),
    _ => None,
  }
}

/// Reads terminal input on a blocking thread and interleaves ticks
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm's poll/read block, so keep them off the async workers
    tokio::task::spawn_blocking(move || loop {
      let next = match event::poll(tick_rate) {
        Ok(true) => match event::read() {
          Ok(evt) => translate(evt),
          Err(e) => {
            debug!(error = %e, "terminal read failed");
            None
          }
        },
        Ok(false) => Some(Event::Tick),
        Err(e) => {
          debug!(error = %e, "terminal poll failed");
          Some(Event::Tick)
        }
      };

      if let Some(evt) = next {
        if tx.send(evt).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
