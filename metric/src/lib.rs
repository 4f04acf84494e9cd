//! An in-process metric registry.
//!
//! Instruments are registered by name and carry a set of observers, one per
//! distinct attribute set. Recorders handed out to callers are cheap clones
//! backed by shared atomics, so the hot path (incrementing a counter) never
//! takes the registry lock. Exporters walk the registry through the
//! [`Reporter`] trait and never mutate anything.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use parking_lot::Mutex;
use std::any::Any;
use std::borrow::Cow;
use std::collections::{btree_map::Entry, BTreeMap};
use std::fmt::Debug;
use std::sync::Arc;

mod counter;
mod gauge;

pub use counter::U64Counter;
pub use gauge::U64Gauge;

/// A registry of metric instruments, keyed by metric name.
///
/// Cheap to share behind an [`Arc`]; all interior state is lock-protected.
#[derive(Debug, Default)]
pub struct Registry {
    instruments: Mutex<BTreeMap<&'static str, Box<dyn Instrument>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the [`Metric`] registered under `name`, creating it if this is
    /// the first registration.
    ///
    /// # Panics
    ///
    /// Panics if `name` was previously registered with a different observer
    /// type.
    pub fn register_metric<T: MetricObserver>(
        &self,
        name: &'static str,
        description: &'static str,
    ) -> Metric<T> {
        let mut instruments = self.instruments.lock();
        match instruments.entry(name) {
            Entry::Occupied(o) => o
                .get()
                .as_any()
                .downcast_ref::<Metric<T>>()
                .unwrap_or_else(|| panic!("metric \"{name}\" registered with a different type"))
                .clone(),
            Entry::Vacant(v) => {
                let metric = Metric::<T>::new(name, description);
                v.insert(Box::new(metric.clone()));
                metric
            }
        }
    }

    /// Returns the already-registered [`Metric`] named `name`, if any.
    pub fn get_instrument<T: MetricObserver>(&self, name: &'static str) -> Option<Metric<T>> {
        self.instruments
            .lock()
            .get(name)
            .and_then(|i| i.as_any().downcast_ref::<Metric<T>>().cloned())
    }

    /// Walks every registered instrument in name order, feeding each
    /// observation to `reporter`.
    pub fn report(&self, reporter: &mut dyn Reporter) {
        for instrument in self.instruments.lock().values() {
            instrument.report(reporter);
        }
    }
}

/// A type-erased entry in the [`Registry`].
pub trait Instrument: Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn report(&self, reporter: &mut dyn Reporter);
}

/// A named instrument holding one observer per attribute set.
#[derive(Debug, Clone)]
pub struct Metric<T: MetricObserver> {
    pub name: &'static str,
    pub description: &'static str,
    shared: Arc<Mutex<BTreeMap<Attributes, T>>>,
}

impl<T: MetricObserver> Metric<T> {
    fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            shared: Default::default(),
        }
    }

    /// Returns the recorder for `attributes`, creating the observer on first
    /// use.
    pub fn recorder(&self, attributes: impl Into<Attributes>) -> T::Recorder {
        self.shared
            .lock()
            .entry(attributes.into())
            .or_default()
            .recorder()
    }

    /// Returns a clone of the observer for `attributes`, if one exists.
    pub fn get_observer(&self, attributes: &Attributes) -> Option<T> {
        self.shared.lock().get(attributes).cloned()
    }
}

impl<T: MetricObserver> Instrument for Metric<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn report(&self, reporter: &mut dyn Reporter) {
        reporter.start_metric(self.name, self.description, T::kind());
        for (attributes, observer) in self.shared.lock().iter() {
            reporter.report_observation(attributes, observer.observe());
        }
        reporter.finish_metric();
    }
}

/// Types that can observe a metric value and hand out recorders for it.
pub trait MetricObserver: Debug + Default + Clone + Send + Sync + 'static {
    /// The type callers use to record values.
    type Recorder;

    fn kind() -> MetricKind;

    fn recorder(&self) -> Self::Recorder;

    fn observe(&self) -> Observation;
}

/// The kind of a metric, as reported to exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    U64Counter,
    U64Gauge,
}

/// A single observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    U64Counter(u64),
    U64Gauge(u64),
}

/// An ordered set of key/value attributes qualifying an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attributes(BTreeMap<&'static str, Cow<'static, str>>);

impl Attributes {
    pub fn insert(&mut self, key: &'static str, value: impl Into<Cow<'static, str>>) {
        self.0.insert(key, value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&&'static str, &Cow<'static, str>)> {
        self.0.iter()
    }
}

impl<T: Into<Cow<'static, str>>, const N: usize> From<[(&'static str, T); N]> for Attributes {
    fn from(pairs: [(&'static str, T); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k, v.into()))
                .collect(),
        )
    }
}

/// A sink for the observations of a [`Registry::report`] walk.
///
/// Calls arrive in the fixed order `start_metric`, zero or more
/// `report_observation`, `finish_metric`, repeated per instrument.
pub trait Reporter {
    fn start_metric(&mut self, metric_name: &'static str, description: &'static str, kind: MetricKind);

    fn report_observation(&mut self, attributes: &Attributes, observation: Observation);

    fn finish_metric(&mut self);
}

/// A [`Reporter`] that buffers everything it is fed. Test use only.
#[derive(Debug, Default)]
pub struct RawReporter {
    metrics: Vec<ObservedMetric>,
}

/// One instrument's worth of buffered observations.
#[derive(Debug)]
pub struct ObservedMetric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub observations: Vec<(Attributes, Observation)>,
}

impl RawReporter {
    pub fn metric(&self, name: &str) -> Option<&ObservedMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn observation(&self, name: &str, attributes: &Attributes) -> Option<&Observation> {
        self.metric(name)?
            .observations
            .iter()
            .find(|(a, _)| a == attributes)
            .map(|(_, o)| o)
    }
}

impl Reporter for RawReporter {
    fn start_metric(&mut self, metric_name: &'static str, _description: &'static str, kind: MetricKind) {
        self.metrics.push(ObservedMetric {
            name: metric_name,
            kind,
            observations: vec![],
        });
    }

    fn report_observation(&mut self, attributes: &Attributes, observation: Observation) {
        self.metrics
            .last_mut()
            .expect("observation reported outside of a metric")
            .observations
            .push((attributes.clone(), observation));
    }

    fn finish_metric(&mut self) {}
}
