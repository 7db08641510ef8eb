//! Scroll-session coordinator
//!
//! Everything runs on one scheduling loop: device events and driver ticks
//! arrive on the same channel, and only this loop pumps the script engine.
//! The session routine and the repeat-fire routine both operate on the
//! `ScrollState` owned by the `Coordinator`.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::click::{ClickExecutor, ScrollDirection};
use crate::config::ScrollConfig;
use crate::event::{Button, EventKind, PointerEvent};
use crate::interval::Interval;
use crate::script::{Engine, Routine, Script, Suspend, TaskHandle};
use crate::{Error, Result};

/// Messages consumed by the scheduling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Pointer(PointerEvent),
    /// One beat of the periodic driver
    Tick,
    /// The device reader stopped; carries the reason
    DeviceClosed(String),
}

/// Raw pointer motion seen since the current session began, capped
#[derive(Debug, Clone, Copy)]
pub struct MoveCounter {
    count: u32,
    max: u32,
}

impl MoveCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    pub fn bump(&mut self) {
        if self.count < self.max {
            self.count += 1;
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn get(&self) -> u32 {
        self.count
    }
}

/// The active session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSession {
    pub button: Button,
    pub direction: ScrollDirection,
    pub accelerated: bool,
    pub started_at: Instant,
}

impl ScrollSession {
    /// How long the thumb button has been held
    pub fn held(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Clicks issued by one turn of the repeat-fire routine
pub fn clicks_per_turn(accelerated: bool, moves: u32, config: &ScrollConfig) -> u32 {
    if !accelerated {
        return 1;
    }
    config
        .tiers
        .iter()
        .filter(|tier| moves > tier.above)
        .fold(config.accelerated_base_clicks, |clicks, tier| clicks + tier.extra)
}

struct ScrollState {
    config: ScrollConfig,
    clicker: Box<dyn ClickExecutor>,
    ticker: Interval,
    moves: MoveCounter,
    /// Latest thumb event, consumed by the session routine on the next pump
    pending: Option<PointerEvent>,
    session: Option<ScrollSession>,
    last_session_end: Option<Instant>,
}

impl ScrollState {
    fn click(&mut self, direction: ScrollDirection, count: u32) {
        if let Err(e) = self.clicker.click_n(direction, count) {
            warn!("Wheel click failed: {}", e);
        }
    }
}

enum Phase {
    Idle,
    Scrolling { button: Button, repeat: TaskHandle },
}

/// Main routine: waits for a thumb press, runs the session, waits for the
/// matching release, repeat
struct SessionScript {
    phase: Phase,
}

impl SessionScript {
    fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    fn try_start(cx: &mut Script<'_, ScrollState>) -> Option<Phase> {
        let event = cx.pending.take()?;
        if event.kind != EventKind::ButtonDown {
            return None;
        }
        let direction = event.button.direction()?;

        let now = Instant::now();
        let window = cx.config.acceleration_window();
        let accelerated = cx
            .last_session_end
            .is_some_and(|end| now.duration_since(end) < window);

        cx.moves.reset();
        cx.session = Some(ScrollSession {
            button: event.button,
            direction,
            accelerated,
            started_at: now,
        });
        debug!(%direction, accelerated, "start scroll");

        cx.click(direction, 1);
        let repeat = cx.start_async(RepeatFire::new(direction, accelerated));
        cx.ticker.start();

        Some(Phase::Scrolling {
            button: event.button,
            repeat,
        })
    }

    fn try_end(
        cx: &mut Script<'_, ScrollState>,
        button: Button,
        repeat: &TaskHandle,
    ) -> Option<Phase> {
        let event = cx.pending.take()?;
        if event.kind != EventKind::ButtonUp || event.button != button {
            return None;
        }

        repeat.cancel();
        cx.ticker.stop();
        cx.last_session_end = Some(Instant::now());
        let held_ms = cx
            .session
            .take()
            .map_or(0, |session| session.held().as_millis() as u64);
        debug!(moves = cx.moves.get(), held_ms, "end scroll");

        Some(Phase::Idle)
    }
}

impl Routine<ScrollState> for SessionScript {
    fn resume(&mut self, cx: &mut Script<'_, ScrollState>) -> Suspend {
        let next = match &self.phase {
            Phase::Idle => Self::try_start(cx),
            Phase::Scrolling { button, repeat } => Self::try_end(cx, *button, repeat),
        };
        if let Some(phase) = next {
            self.phase = phase;
        }
        Suspend::Yield
    }
}

/// Sub-routine: after a warm-up delay, clicks once per turn at the current tier
struct RepeatFire {
    direction: ScrollDirection,
    accelerated: bool,
    warmed_up: bool,
}

impl RepeatFire {
    fn new(direction: ScrollDirection, accelerated: bool) -> Self {
        Self {
            direction,
            accelerated,
            warmed_up: false,
        }
    }
}

impl Routine<ScrollState> for RepeatFire {
    fn resume(&mut self, cx: &mut Script<'_, ScrollState>) -> Suspend {
        if !self.warmed_up {
            self.warmed_up = true;
            return Suspend::Sleep(cx.config.warmup());
        }

        let moves = cx.moves.get();
        let clicks = clicks_per_turn(self.accelerated, moves, &cx.config);
        debug!(direction = %self.direction, clicks, moves, "scroll");
        cx.click(self.direction, clicks);
        Suspend::Yield
    }
}

pub struct Coordinator {
    state: ScrollState,
    engine: Engine<ScrollState>,
}

impl Coordinator {
    /// Build the coordinator. The periodic driver feeds `Signal::Tick` into
    /// `tx`, which must be the sender of the channel later passed to `run`.
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ScrollConfig,
        clicker: Box<dyn ClickExecutor>,
        tx: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        let ticker = Interval::new(config.tick_interval(), move || {
            let _ = tx.send(Signal::Tick);
        });
        let mut state = ScrollState {
            moves: MoveCounter::new(config.max_moves),
            config,
            clicker,
            ticker,
            pending: None,
            session: None,
            last_session_end: None,
        };
        let engine = Engine::start(SessionScript::new(), &mut state);
        Self { state, engine }
    }

    /// Apply one signal
    pub fn handle(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::Pointer(event) => {
                if event.is_move() {
                    if self.state.moves.get() == 0 {
                        debug!(%event, "read mouse event");
                    }
                    self.state.moves.bump();
                    return Ok(());
                }

                debug!(%event, "read mouse event");
                if event.button.is_thumb() {
                    self.state.pending = Some(event);
                    self.engine.pump(&mut self.state);
                }
            }
            Signal::Tick => {
                // stale ticks queued before the driver stopped are dropped
                if self.state.ticker.is_running() {
                    self.engine.pump(&mut self.state);
                }
            }
            Signal::DeviceClosed(reason) => return Err(Error::DeviceClosed(reason)),
        }
        Ok(())
    }

    /// Scheduling loop. Returns `Ok` on shutdown and an error when the
    /// device goes away.
    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Signal>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            "Scroll coordinator started: tick={}ms, warmup={}ms, window={}ms",
            self.state.config.tick_interval_ms,
            self.state.config.warmup_ms,
            self.state.config.acceleration_window_ms
        );

        let mut shutdown_open = true;
        let result = loop {
            tokio::select! {
                changed = shutdown.changed(), if shutdown_open => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => {
                            info!("Coordinator received shutdown signal");
                            break Ok(());
                        }
                        Ok(()) => {}
                        Err(_) => shutdown_open = false,
                    }
                }

                signal = rx.recv() => {
                    let outcome = match signal {
                        Some(signal) => self.handle(signal),
                        None => Err(Error::DeviceClosed("event channel closed".to_string())),
                    };
                    if let Err(e) = outcome {
                        break Err(e);
                    }
                }
            }
        };

        self.state.ticker.stop();
        info!("Scroll coordinator stopped");
        result
    }

    pub fn is_scrolling(&self) -> bool {
        self.state.session.is_some()
    }

    pub fn session(&self) -> Option<&ScrollSession> {
        self.state.session.as_ref()
    }

    pub fn moves(&self) -> u32 {
        self.state.moves.get()
    }

    /// Number of live repeat-fire routines; at most one
    pub fn repeaters(&self) -> usize {
        self.engine.live_tasks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingClicker {
        clicks: Arc<Mutex<Vec<ScrollDirection>>>,
        batches: Arc<Mutex<Vec<u32>>>,
    }

    impl RecordingClicker {
        /// Size of each executor call, in order
        fn batches(&self) -> Vec<u32> {
            self.batches.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.clicks.lock().unwrap().len()
        }

        fn all(&self, direction: ScrollDirection) -> bool {
            self.clicks.lock().unwrap().iter().all(|d| *d == direction)
        }
    }

    impl ClickExecutor for RecordingClicker {
        fn click(&mut self, direction: ScrollDirection) -> Result<()> {
            self.click_n(direction, 1)
        }

        fn click_n(&mut self, direction: ScrollDirection, count: u32) -> Result<()> {
            self.batches.lock().unwrap().push(count);
            let mut clicks = self.clicks.lock().unwrap();
            clicks.extend(std::iter::repeat(direction).take(count as usize));
            Ok(())
        }
    }

    struct FailingClicker;

    impl ClickExecutor for FailingClicker {
        fn click(&mut self, _direction: ScrollDirection) -> Result<()> {
            Err(Error::Click("no display".to_string()))
        }
    }

    fn setup() -> (Coordinator, mpsc::UnboundedReceiver<Signal>, RecordingClicker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clicker = RecordingClicker::default();
        let coordinator = Coordinator::new(ScrollConfig::default(), Box::new(clicker.clone()), tx);
        (coordinator, rx, clicker)
    }

    /// Process ticks (and anything else queued) for `duration` of paused time
    async fn run_for(
        coordinator: &mut Coordinator,
        rx: &mut mpsc::UnboundedReceiver<Signal>,
        duration: Duration,
    ) {
        let deadline = Instant::now() + duration;
        while let Ok(Some(signal)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            coordinator.handle(signal).unwrap();
        }
    }

    fn press(coordinator: &mut Coordinator, button: Button) {
        coordinator.handle(Signal::Pointer(PointerEvent::down(button))).unwrap();
    }

    fn release(coordinator: &mut Coordinator, button: Button) {
        coordinator.handle(Signal::Pointer(PointerEvent::up(button))).unwrap();
    }

    fn wiggle(coordinator: &mut Coordinator, n: u32) {
        for _ in 0..n {
            coordinator.handle(Signal::Pointer(PointerEvent::moved(1, 0))).unwrap();
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_clicks_per_turn_tiers() {
        let config = ScrollConfig::default();
        assert_eq!(clicks_per_turn(false, 0, &config), 1);
        assert_eq!(clicks_per_turn(false, 1000, &config), 1);

        assert_eq!(clicks_per_turn(true, 0, &config), 2);
        assert_eq!(clicks_per_turn(true, 200, &config), 2);
        assert_eq!(clicks_per_turn(true, 201, &config), 3);
        assert_eq!(clicks_per_turn(true, 500, &config), 3);
        assert_eq!(clicks_per_turn(true, 501, &config), 5);
        assert_eq!(clicks_per_turn(true, 1000, &config), 5);
        assert_eq!(clicks_per_turn(true, 1001, &config), 8);
    }

    #[test]
    fn test_clicks_per_turn_custom_tiers() {
        let config = ScrollConfig {
            accelerated_base_clicks: 1,
            tiers: vec![TierConfig { above: 10, extra: 4 }],
            ..Default::default()
        };
        assert_eq!(clicks_per_turn(true, 10, &config), 1);
        assert_eq!(clicks_per_turn(true, 11, &config), 5);
    }

    #[test]
    fn test_move_counter_caps_and_resets() {
        let mut counter = MoveCounter::new(1000);
        for _ in 0..1500 {
            counter.bump();
        }
        assert_eq!(counter.get(), 1000);
        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_session_timeline() {
        let (mut coordinator, mut rx, clicker) = setup();
        assert!(!coordinator.is_scrolling());

        press(&mut coordinator, Button::ThumbUp);
        assert!(coordinator.is_scrolling());
        let session = *coordinator.session().unwrap();
        assert_eq!(session.direction, ScrollDirection::Up);
        assert!(!session.accelerated);
        assert_eq!(session.started_at, Instant::now());
        // immediate feedback click
        assert_eq!(clicker.count(), 1);

        // warm-up: nothing repeats before 256ms
        run_for(&mut coordinator, &mut rx, ms(250)).await;
        assert_eq!(clicker.count(), 1);

        // tick at 300ms fires one click, then 400, 500, 600
        run_for(&mut coordinator, &mut rx, ms(400)).await;
        assert_eq!(clicker.count(), 5);
        assert!(coordinator.session().unwrap().held() >= ms(650));

        release(&mut coordinator, Button::ThumbUp);
        assert!(!coordinator.is_scrolling());
        assert_eq!(coordinator.repeaters(), 0);

        run_for(&mut coordinator, &mut rx, ms(1000)).await;
        assert_eq!(clicker.count(), 5);
        assert!(clicker.all(ScrollDirection::Up));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_tap_is_single_click() {
        let (mut coordinator, mut rx, clicker) = setup();
        press(&mut coordinator, Button::ThumbDown);
        run_for(&mut coordinator, &mut rx, ms(120)).await;
        release(&mut coordinator, Button::ThumbDown);
        run_for(&mut coordinator, &mut rx, ms(1000)).await;
        assert_eq!(clicker.count(), 1);
        assert!(clicker.all(ScrollDirection::Down));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acceleration_window() {
        let (mut coordinator, mut rx, _clicker) = setup();

        press(&mut coordinator, Button::ThumbDown);
        assert!(!coordinator.session().unwrap().accelerated);
        release(&mut coordinator, Button::ThumbDown);

        run_for(&mut coordinator, &mut rx, ms(200)).await;
        press(&mut coordinator, Button::ThumbDown);
        assert!(coordinator.session().unwrap().accelerated);
        release(&mut coordinator, Button::ThumbDown);

        run_for(&mut coordinator, &mut rx, ms(300)).await;
        press(&mut coordinator, Button::ThumbDown);
        assert!(!coordinator.session().unwrap().accelerated);
        release(&mut coordinator, Button::ThumbDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accelerated_session_follows_move_tiers() {
        let (mut coordinator, mut rx, clicker) = setup();

        press(&mut coordinator, Button::ThumbUp);
        release(&mut coordinator, Button::ThumbUp);
        run_for(&mut coordinator, &mut rx, ms(100)).await;

        press(&mut coordinator, Button::ThumbUp);
        assert!(coordinator.session().unwrap().accelerated);
        assert_eq!(clicker.count(), 2);

        // past the warm-up: one turn at 2 clicks (tick at 300ms)
        run_for(&mut coordinator, &mut rx, ms(350)).await;
        assert_eq!(clicker.count(), 4);

        wiggle(&mut coordinator, 600);
        run_for(&mut coordinator, &mut rx, ms(100)).await;
        assert_eq!(clicker.count(), 9);

        wiggle(&mut coordinator, 1000);
        assert_eq!(coordinator.moves(), 1000);
        run_for(&mut coordinator, &mut rx, ms(100)).await;
        assert_eq!(clicker.count(), 14);

        release(&mut coordinator, Button::ThumbUp);
        run_for(&mut coordinator, &mut rx, ms(500)).await;
        assert_eq!(clicker.count(), 14);
        // each turn reaches the executor as a single batch
        assert_eq!(clicker.batches(), vec![1, 1, 2, 5, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_moves_reset_on_session_start() {
        let (mut coordinator, _rx, _clicker) = setup();
        wiggle(&mut coordinator, 42);
        assert_eq!(coordinator.moves(), 42);

        press(&mut coordinator, Button::ThumbUp);
        assert_eq!(coordinator.moves(), 0);
        wiggle(&mut coordinator, 5);
        assert_eq!(coordinator.moves(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_matching_release_ends_session() {
        let (mut coordinator, _rx, clicker) = setup();

        // stray release while idle
        release(&mut coordinator, Button::ThumbUp);
        assert!(!coordinator.is_scrolling());

        press(&mut coordinator, Button::ThumbUp);
        press(&mut coordinator, Button::ThumbDown);
        release(&mut coordinator, Button::ThumbDown);
        press(&mut coordinator, Button::Left);
        release(&mut coordinator, Button::Left);
        assert!(coordinator.is_scrolling());
        assert_eq!(coordinator.session().unwrap().direction, ScrollDirection::Up);

        release(&mut coordinator, Button::ThumbUp);
        assert!(!coordinator.is_scrolling());
        assert_eq!(clicker.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_has_no_leftover_ticks() {
        let (mut coordinator, mut rx, clicker) = setup();

        press(&mut coordinator, Button::ThumbDown);
        run_for(&mut coordinator, &mut rx, ms(350)).await;
        assert_eq!(clicker.count(), 2);
        release(&mut coordinator, Button::ThumbDown);

        run_for(&mut coordinator, &mut rx, ms(1000)).await;
        press(&mut coordinator, Button::ThumbDown);
        assert_eq!(coordinator.repeaters(), 1);
        // the new session gets a fresh warm-up
        run_for(&mut coordinator, &mut rx, ms(250)).await;
        assert_eq!(clicker.count(), 3);
        run_for(&mut coordinator, &mut rx, ms(100)).await;
        assert_eq!(clicker.count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_failures_do_not_end_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = Coordinator::new(ScrollConfig::default(), Box::new(FailingClicker), tx);
        press(&mut coordinator, Button::ThumbUp);
        run_for(&mut coordinator, &mut rx, ms(500)).await;
        assert!(coordinator.is_scrolling());
        release(&mut coordinator, Button::ThumbUp);
        assert!(!coordinator.is_scrolling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator =
            Coordinator::new(ScrollConfig::default(), Box::new(RecordingClicker::default()), tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(coordinator.run(rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_when_device_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let clicker = RecordingClicker::default();
        let coordinator = Coordinator::new(ScrollConfig::default(), Box::new(clicker.clone()), tx.clone());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(Signal::Pointer(PointerEvent::down(Button::ThumbUp))).unwrap();
        tx.send(Signal::DeviceClosed("unplugged".to_string())).unwrap();

        let result = coordinator.run(rx, shutdown_rx).await;
        assert!(matches!(result, Err(Error::DeviceClosed(reason)) if reason == "unplugged"));
        assert_eq!(clicker.count(), 1);
    }
}
