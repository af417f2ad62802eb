use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::{Result, ValidationFailure};
use crate::model::{Alert, TruckView};
use crate::registry::Fleet;
use crate::session::{authenticate, Credentials, Event, Notice, Session, State};
use crate::sink::TabularSink;

/// Readings shown in the chart of the selected truck.
pub const CHART_POINTS: usize = 20;

/// Drives a [`Session`] through its states against one fleet and one sink.
pub struct Monitor<S, R> {
    fleet: Fleet,
    sink: S,
    rng: R,
    tenant: Credentials,
}

impl<S: TabularSink, R: Rng> Monitor<S, R> {
    pub fn new(fleet: Fleet, sink: S, rng: R, tenant: Credentials) -> Self {
        Self {
            fleet,
            sink,
            rng,
            tenant,
        }
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn handle(&mut self, session: &mut Session, event: Event) -> Notice {
        if !session.is_authenticated() {
            return match event {
                Event::Login { user, password } => self.login(session, &user, &password),
                _ => Notice::warning("log in first"),
            };
        }

        match event {
            Event::Login { .. } => Notice::info("already logged in"),
            Event::Select(key) => self.select(session, key),
            Event::Back => {
                session.transition(State::Browsing);
                Notice::info("back to the fleet list")
            }
            Event::ToggleLive => match session.state().clone() {
                State::Viewing(key) => {
                    info!("Session {} live monitoring {}", session.id(), key);
                    let notice = Notice::info(format!("live monitoring {}", key));
                    session.transition(State::LiveMonitoring(key));
                    notice
                }
                State::LiveMonitoring(key) => {
                    info!("Session {} stopped live monitoring", session.id());
                    session.transition(State::Viewing(key));
                    Notice::info("live monitoring stopped")
                }
                _ => Notice::warning("select a truck first"),
            },
            Event::Reset => match session.state().selected() {
                Some(key) => {
                    let key = key.to_string();
                    self.reset(&key)
                }
                None => Notice::warning("select a truck first"),
            },
            Event::Tick => match session.state().clone() {
                State::LiveMonitoring(key) => self.tick(&key),
                _ => Notice::info("live monitoring is off"),
            },
        }
    }

    fn login(&mut self, session: &mut Session, user: &str, password: &str) -> Notice {
        match authenticate(user, password, &self.tenant) {
            Ok(()) => {
                session.authenticate();
                info!("Session {} authenticated", session.id());
                Notice::success(format!("welcome, {}", user.trim()))
            }
            Err(e @ ValidationFailure::InvalidCredentials) => {
                warn!("Session {} failed login", session.id());
                Notice::error(e.to_string())
            }
            Err(e) => Notice::warning(e.to_string()),
        }
    }

    fn select(&mut self, session: &mut Session, key: String) -> Notice {
        match self.fleet.get(&key) {
            Ok(_) => {
                let notice = Notice::info(format!("viewing {}", key));
                session.transition(State::Viewing(key));
                notice
            }
            Err(e) => {
                session.transition(State::Browsing);
                Notice::error(e.to_string())
            }
        }
    }

    fn reset(&mut self, key: &str) -> Notice {
        let truck = match self.fleet.get_mut(key) {
            Ok(truck) => truck,
            Err(e) => return Notice::error(e.to_string()),
        };

        truck.sensor_mut().reset(&mut self.rng);
        info!("Reset history of {}", key);

        if truck.persist(&mut self.sink) {
            Notice::success(format!("history of {} reset", key))
        } else {
            Notice::warning(format!("history of {} reset, workbook not updated", key))
        }
    }

    /// One live step: the viewed truck is simulated and flushed first, the
    /// rest of the fleet only advances in memory.
    fn tick(&mut self, key: &str) -> Notice {
        let truck = match self.fleet.get_mut(key) {
            Ok(truck) => truck,
            Err(e) => return Notice::error(e.to_string()),
        };

        let reading = truck.sensor_mut().simulate_reading(&mut self.rng);
        let alert = truck.sensor().classify(&reading);
        let saved = truck.persist(&mut self.sink);

        self.fleet.simulate_all_except(key, &mut self.rng);
        debug!("Tick advanced {} trucks", self.fleet.len());

        let mut text = format!("{}: {:.2} °C {}", key, reading.value, alert);
        if !saved {
            text.push_str(" (not saved)");
        }
        match alert {
            Alert::Normal => Notice::success(text),
            Alert::Freeze => {
                warn!("{} below {:.1} °C: {:.2}", key, reading.lower_bound, reading.value);
                Notice::warning(text)
            }
            Alert::Overheat => {
                warn!("{} above {:.1} °C: {:.2}", key, reading.upper_bound, reading.value);
                Notice::error(text)
            }
        }
    }

    /// Keys matching `needle`; nothing is listed before login.
    pub fn list<'a>(&'a self, session: &Session, needle: &str) -> Vec<&'a str> {
        if !session.is_authenticated() {
            return Vec::new();
        }
        self.fleet.filter(needle).collect()
    }

    pub fn view(&self, session: &Session) -> Option<TruckView> {
        let key = session.state().selected()?;
        let truck = self.fleet.get(key).ok()?;
        let sensor = truck.sensor();
        let history = sensor.history();
        let latest = history.latest().cloned();

        Some(TruckView {
            key: key.to_string(),
            sensor_id: sensor.id(),
            bounds: sensor.bounds(),
            alert: latest.as_ref().map(|r| sensor.classify(r)),
            latest,
            mean: history.mean_value(),
            critical: history.critical_entries().count(),
            total: history.len(),
            chart: history.chart_rows(CHART_POINTS),
        })
    }
}

impl<S, R> Monitor<S, R>
where
    S: TabularSink + Send + 'static,
    R: Rng + Send + 'static,
{
    /// Sleeps the whole `delay`, then applies one [`Event::Tick`] on the
    /// blocking pool, since the workbook write may sit in its retry backoff.
    pub async fn live_tick(
        mut self,
        mut session: Session,
        delay: Duration,
    ) -> Result<(Self, Session, Notice)> {
        tokio::time::sleep(delay).await;
        let step = tokio::task::spawn_blocking(move || {
            let notice = self.handle(&mut session, Event::Tick);
            (self, session, notice)
        });
        Ok(step.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::model::Bounds;
    use crate::registry::Truck;
    use crate::sensor::Sensor;
    use crate::session::Level;
    use crate::sink::{Sheet, Workbook};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FIRST: &str = "C-001 | JJ-KL-01";
    const SECOND: &str = "C-002 | JJ-KL-02";

    struct LockedSink;

    impl TabularSink for LockedSink {
        fn write_sheets(&mut self, _sheets: Vec<(String, Sheet)>) -> Result<()> {
            Err(Error::SinkUnavailable(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )))
        }
    }

    fn fleet() -> Fleet {
        let mut fleet = Fleet::new();
        fleet.insert(Truck::new("C-001", "JJ-KL-01", Sensor::new(1, Bounds::DEFAULT)));
        fleet.insert(Truck::new("C-002", "JJ-KL-02", Sensor::new(2, Bounds::DEFAULT)));
        fleet
    }

    fn monitor<S: TabularSink>(sink: S) -> Monitor<S, StdRng> {
        Monitor::new(
            fleet(),
            sink,
            StdRng::seed_from_u64(21),
            Credentials::new("admin", "admin"),
        )
    }

    fn logged_in<S: TabularSink>(monitor: &mut Monitor<S, StdRng>) -> Session {
        let mut session = Session::new();
        let notice = monitor.handle(
            &mut session,
            Event::Login {
                user: "admin".into(),
                password: "admin".into(),
            },
        );
        assert_eq!(notice.level, Level::Success);
        session
    }

    #[test]
    fn test_events_before_login_are_refused() {
        let mut monitor = monitor(Workbook::default());
        let mut session = Session::new();

        let notice = monitor.handle(&mut session, Event::Select(FIRST.into()));
        assert_eq!(notice.level, Level::Warning);
        assert_eq!(session.state(), &State::Unauthenticated);
        assert!(monitor.list(&session, "").is_empty());
    }

    #[test]
    fn test_login_failures_keep_state() {
        let mut monitor = monitor(Workbook::default());
        let mut session = Session::new();

        let missing = monitor.handle(
            &mut session,
            Event::Login {
                user: "admin".into(),
                password: "".into(),
            },
        );
        assert_eq!(missing.level, Level::Warning);

        let wrong = monitor.handle(
            &mut session,
            Event::Login {
                user: "admin".into(),
                password: "root".into(),
            },
        );
        assert_eq!(wrong.level, Level::Error);
        assert!(!session.is_authenticated());
        assert_eq!(session.state(), &State::Unauthenticated);
    }

    #[test]
    fn test_select_toggle_and_back() {
        let mut monitor = monitor(Workbook::default());
        let mut session = logged_in(&mut monitor);
        assert_eq!(session.state(), &State::Browsing);

        monitor.handle(&mut session, Event::Select(FIRST.into()));
        assert_eq!(session.state(), &State::Viewing(FIRST.into()));

        monitor.handle(&mut session, Event::ToggleLive);
        assert_eq!(session.state(), &State::LiveMonitoring(FIRST.into()));

        monitor.handle(&mut session, Event::ToggleLive);
        assert_eq!(session.state(), &State::Viewing(FIRST.into()));

        monitor.handle(&mut session, Event::Back);
        assert_eq!(session.state(), &State::Browsing);
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_select_unknown_key() {
        let mut monitor = monitor(Workbook::default());
        let mut session = logged_in(&mut monitor);
        monitor.handle(&mut session, Event::Select(FIRST.into()));

        let notice = monitor.handle(&mut session, Event::Select("C-999 | JJ-KL-999".into()));
        assert_eq!(notice.level, Level::Error);
        assert_eq!(session.state(), &State::Browsing);
        assert!(monitor.view(&session).is_none());
    }

    #[test]
    fn test_toggle_without_selection() {
        let mut monitor = monitor(Workbook::default());
        let mut session = logged_in(&mut monitor);

        let notice = monitor.handle(&mut session, Event::ToggleLive);
        assert_eq!(notice.level, Level::Warning);
        assert_eq!(session.state(), &State::Browsing);
    }

    #[test]
    fn test_tick_flushes_only_viewed_truck() {
        let mut monitor = monitor(Workbook::default());
        let mut session = logged_in(&mut monitor);
        monitor.handle(&mut session, Event::Select(FIRST.into()));
        monitor.handle(&mut session, Event::ToggleLive);

        monitor.handle(&mut session, Event::Tick);
        monitor.handle(&mut session, Event::Tick);

        assert!(monitor.sink().sheet("C-001").is_some());
        assert!(monitor.sink().sheet("C-002").is_none());
        for key in [FIRST, SECOND] {
            let truck = monitor.fleet().get(key).unwrap();
            assert_eq!(truck.sensor().history().len(), 2);
        }
    }

    #[test]
    fn test_tick_ignored_outside_live() {
        let mut monitor = monitor(Workbook::default());
        let mut session = logged_in(&mut monitor);
        monitor.handle(&mut session, Event::Select(FIRST.into()));

        monitor.handle(&mut session, Event::Tick);
        assert!(monitor.fleet().get(FIRST).unwrap().sensor().history().is_empty());
    }

    #[test]
    fn test_locked_sink_does_not_stop_monitoring() {
        let mut monitor = monitor(LockedSink);
        let mut session = logged_in(&mut monitor);
        monitor.handle(&mut session, Event::Select(FIRST.into()));
        monitor.handle(&mut session, Event::ToggleLive);

        let notice = monitor.handle(&mut session, Event::Tick);
        assert!(notice.text.ends_with("(not saved)"));
        assert_eq!(session.state(), &State::LiveMonitoring(FIRST.into()));
        assert_eq!(monitor.fleet().get(FIRST).unwrap().sensor().history().len(), 1);

        let reset = monitor.handle(&mut session, Event::Reset);
        assert_eq!(reset.level, Level::Warning);
        assert_eq!(
            monitor.fleet().get(FIRST).unwrap().sensor().history().len(),
            crate::sensor::SEED_COUNT
        );
    }

    #[test]
    fn test_view_of_selected_truck() {
        let mut monitor = monitor(Workbook::default());
        let mut session = logged_in(&mut monitor);
        monitor.handle(&mut session, Event::Select(SECOND.into()));
        monitor.handle(&mut session, Event::Reset);

        let view = monitor.view(&session).unwrap();
        assert_eq!(view.key, SECOND);
        assert_eq!(view.sensor_id, 2);
        assert_eq!(view.total, crate::sensor::SEED_COUNT);
        assert_eq!(view.critical, 0);
        assert_eq!(view.alert, Some(Alert::Normal));
        assert_eq!(view.chart.len(), crate::sensor::SEED_COUNT);
        assert!(view.mean.is_some());
    }

    #[test]
    fn test_live_tick_waits_then_ticks() {
        tokio_test::block_on(async {
            let mut monitor = monitor(Workbook::default());
            let mut session = logged_in(&mut monitor);
            monitor.handle(&mut session, Event::Select(FIRST.into()));
            monitor.handle(&mut session, Event::ToggleLive);

            let start = std::time::Instant::now();
            let (monitor, session, notice) = monitor
                .live_tick(session, Duration::from_millis(20))
                .await
                .unwrap();

            assert!(start.elapsed() >= Duration::from_millis(20));
            assert!(notice.text.starts_with(FIRST));
            assert_eq!(session.state(), &State::LiveMonitoring(FIRST.into()));
            assert!(monitor.sink().sheet("C-001").is_some());
            assert_eq!(monitor.fleet().get(FIRST).unwrap().sensor().history().len(), 1);
        });
    }

    /// Sink whose every write stalls like a workbook stuck in retry backoff.
    struct SlowSink;

    impl TabularSink for SlowSink {
        fn write_sheets(&mut self, _sheets: Vec<(String, Sheet)>) -> Result<()> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }

    #[test]
    fn test_slow_write_does_not_stall_runtime() {
        tokio_test::block_on(async {
            let mut monitor = monitor(SlowSink);
            let mut session = logged_in(&mut monitor);
            monitor.handle(&mut session, Event::Select(FIRST.into()));
            monitor.handle(&mut session, Event::ToggleLive);

            let start = std::time::Instant::now();
            let timer = async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                start.elapsed()
            };
            let (tick, timer_elapsed) =
                tokio::join!(monitor.live_tick(session, Duration::ZERO), timer);

            assert!(tick.is_ok());
            assert!(
                timer_elapsed < Duration::from_millis(200),
                "timer held up for {:?}",
                timer_elapsed
            );
        });
    }
}
