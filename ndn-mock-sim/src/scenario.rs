use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use ndn_mock_core::packets::DEFAULT_INTEREST_LIFETIME;
use ndn_mock_core::{Data, ForwardingFlags, Interest, Name};
use ndn_mock_forwarder::config::{ForwarderSection, LoggingConfig, MockFaceSection};
use ndn_mock_forwarder::{Face, ForwarderConfig, MockForwarder, StatsSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Event-pump passes over every face
    pub rounds: usize,
    pub forwarder: ForwarderSection,
    pub logging: LoggingConfig,
    pub producer: Vec<ProducerSpec>,
    pub consumer: Vec<ConsumerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSpec {
    pub prefix: String,
    pub content: String,
    #[serde(default = "default_child_inherit")]
    pub child_inherit: bool,
    #[serde(default)]
    pub capture: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSpec {
    pub name: String,
    pub lifetime_ms: Option<u64>,
}

fn default_child_inherit() -> bool {
    true
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            rounds: 4,
            forwarder: ForwarderSection::default(),
            logging: LoggingConfig::default(),
            producer: Vec::new(),
            consumer: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            forwarder: self.forwarder.clone(),
            mock_face: MockFaceSection::default(),
            logging: self.logging.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProducerReport {
    pub prefix: String,
    pub face_id: u64,
    pub registered: bool,
    pub interests_answered: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Satisfied { data_name: String, content: String },
    TimedOut,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerReport {
    pub name: String,
    pub face_id: u64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub rounds: usize,
    pub producers: Vec<ProducerReport>,
    pub consumers: Vec<ConsumerReport>,
    pub fib_entries: usize,
    pub pit_entries: usize,
    pub stats: StatsSnapshot,
}

struct Producer {
    spec: ProducerSpec,
    face: Face,
    registered: Arc<Mutex<Option<bool>>>,
    answered: Arc<Mutex<usize>>,
}

struct Consumer {
    spec: ConsumerSpec,
    face: Face,
    outcome: Arc<Mutex<Outcome>>,
}

fn parse_name(uri: &str) -> Result<Name> {
    uri.parse().with_context(|| format!("Invalid name {uri}"))
}

fn start_producer(forwarder: &MockForwarder, spec: &ProducerSpec) -> Result<Producer> {
    let face = forwarder.connect();
    let prefix = parse_name(&spec.prefix)?;
    let flags = ForwardingFlags::new(spec.child_inherit, spec.capture);
    let registered = Arc::new(Mutex::new(None));
    let answered = Arc::new(Mutex::new(0));

    let content = spec.content.clone().into_bytes();
    let counter = answered.clone();
    let outcome = registered.clone();
    face.register_prefix(
        prefix,
        flags,
        move |_: &Name, interest: &Interest, face: &Face| {
            debug!("Producer answering {}", interest.name);
            match face.put_data(&Data::new(interest.name.clone(), content.clone())) {
                Ok(()) => *counter.lock().unwrap_or_else(|e| e.into_inner()) += 1,
                Err(e) => warn!("Producer failed to answer {}: {}", interest.name, e),
            }
        },
        move |prefix: &Name, result| {
            if let Err(e) = &result {
                warn!("Registration of {} failed: {}", prefix, e);
            }
            *outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.is_ok());
        },
    )
    .with_context(|| format!("Failed to register {}", spec.prefix))?;

    Ok(Producer {
        spec: spec.clone(),
        face,
        registered,
        answered,
    })
}

fn start_consumer(forwarder: &MockForwarder, spec: &ConsumerSpec) -> Result<Consumer> {
    let face = forwarder.connect();
    let lifetime = spec
        .lifetime_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_INTEREST_LIFETIME);
    let interest = Interest::new(parse_name(&spec.name)?).with_lifetime(lifetime);
    let outcome = Arc::new(Mutex::new(Outcome::Pending));

    let on_data = outcome.clone();
    let on_timeout = outcome.clone();
    face.express_interest_with_timeout(
        interest,
        move |_, data| {
            *on_data.lock().unwrap_or_else(|e| e.into_inner()) = Outcome::Satisfied {
                data_name: data.name.to_uri(),
                content: String::from_utf8_lossy(&data.content).into_owned(),
            };
        },
        move |_| {
            *on_timeout.lock().unwrap_or_else(|e| e.into_inner()) = Outcome::TimedOut;
        },
    )
    .with_context(|| format!("Failed to express {}", spec.name))?;

    Ok(Consumer {
        spec: spec.clone(),
        face,
        outcome,
    })
}

/// Register every producer, express every consumer Interest, then pump all
/// faces for the configured number of rounds
pub fn run(scenario: &Scenario) -> Result<Report> {
    let forwarder = MockForwarder::with_config(scenario.forwarder_config());

    let producers = scenario
        .producer
        .iter()
        .map(|spec| start_producer(&forwarder, spec))
        .collect::<Result<Vec<_>>>()?;
    for producer in &producers {
        producer.face.process_events();
    }
    info!("Registered {} producers", producers.len());

    let consumers = scenario
        .consumer
        .iter()
        .map(|spec| start_consumer(&forwarder, spec))
        .collect::<Result<Vec<_>>>()?;

    for round in 0..scenario.rounds {
        let processed: usize = producers
            .iter()
            .map(|p| &p.face)
            .chain(consumers.iter().map(|c| &c.face))
            .map(Face::process_events)
            .sum();
        debug!("Round {}: {} packets processed", round, processed);
    }

    let report = Report {
        rounds: scenario.rounds,
        producers: producers
            .iter()
            .map(|p| ProducerReport {
                prefix: p.spec.prefix.clone(),
                face_id: p.face.id(),
                registered: p.registered.lock().map(|r| r.unwrap_or(false)).unwrap_or(false),
                interests_answered: p.answered.lock().map(|n| *n).unwrap_or(0),
            })
            .collect(),
        consumers: consumers
            .iter()
            .map(|c| ConsumerReport {
                name: c.spec.name.clone(),
                face_id: c.face.id(),
                outcome: c
                    .outcome
                    .lock()
                    .map(|o| o.clone())
                    .unwrap_or(Outcome::Pending),
            })
            .collect(),
        fib_entries: forwarder.fib().len(),
        pit_entries: forwarder.pit().len(),
        stats: forwarder.snapshot(),
    };
    Ok(report)
}
