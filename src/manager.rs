//! The public façade.
//!
//! A `ContextManager` owns its observation log, audit chain, anchor and
//! session buffer for its lifetime and is the single write path into
//! memory. It wires the sanitizer, Observer and Reflector together,
//! holds the injected capabilities, and creates the anchor at init.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{HeuristicTokenizer, LlmAdapter, Role, Tokenizer};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::memory::{
    self, Observation, Observer, Priority, Reflector, SessionBuffer, SessionMessage,
    ObservationLog,
};
use crate::runs::RunState;
use crate::security::{Anchor, DriftCheck, Sanitizer, Trust, WriteSource};

pub struct ContextManager {
    config: Config,
    clock: Arc<dyn Clock>,
    tokenizer: Arc<dyn Tokenizer>,
    llm: Arc<dyn LlmAdapter>,
    sanitizer: Sanitizer,
    log: ObservationLog,
    anchor: Anchor,
    observer: Observer,
    reflector: Reflector,
    session: SessionBuffer,
    run_id: String,
}

impl ContextManager {
    /// Construct with the default wall clock and heuristic tokenizer
    /// and a fresh run id.
    pub fn new(config: Config, task_text: &str, llm: Arc<dyn LlmAdapter>) -> Result<Self> {
        let run_id = format!("run-{}", Uuid::new_v4());
        Self::with_capabilities(
            config,
            task_text,
            &run_id,
            llm,
            Arc::new(HeuristicTokenizer),
            Arc::new(SystemClock),
        )
    }

    /// Full constructor: every capability injected, run id supplied by
    /// the caller. Reopening an existing run id replays its session
    /// buffer.
    pub fn with_capabilities(
        config: Config,
        task_text: &str,
        run_id: &str,
        llm: Arc<dyn LlmAdapter>,
        tokenizer: Arc<dyn Tokenizer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let storage_dir = config.storage_dir();
        memory::init_storage(&storage_dir)?;
        memory::init_runs_dir(&config.runs_dir())?;

        let log = ObservationLog::open(&storage_dir);
        log.init(clock.now())?;

        let session = SessionBuffer::open(&config.sessions_dir(), run_id, tokenizer.as_ref())?;
        let anchor = Anchor::create(task_text, clock.now());
        info!(run_id, anchor = anchor.sha256(), "context manager ready");

        Ok(Self {
            sanitizer: Sanitizer::new(config.max_entry_chars),
            observer: Observer::new(config.observer_threshold),
            reflector: Reflector::new(config.reflector_threshold),
            anchor,
            log,
            session,
            run_id: run_id.to_string(),
            config,
            clock,
            tokenizer,
            llm,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn observation_log(&self) -> &ObservationLog {
        &self.log
    }

    pub fn buffered_tokens(&self) -> u32 {
        self.session.token_count()
    }

    /// Buffer an internally produced message. Triggers an Observer pass
    /// when the buffer crosses the threshold.
    pub fn note_message(&mut self, role: Role, content: &str) -> Result<()> {
        let message = SessionMessage {
            role,
            content: content.to_string(),
            trust: Trust::Internal,
            origin: None,
            ts: self.clock.now(),
        };
        self.session.push(message, self.tokenizer.as_ref())?;
        self.maybe_observe()
    }

    /// Buffer external text. It is stored raw in the session transcript
    /// and sanitized/wrapped on its way to the LLM.
    pub fn note_external(&mut self, content: &str, origin: Option<&str>) -> Result<()> {
        let message = SessionMessage {
            role: Role::User,
            content: content.to_string(),
            trust: Trust::External,
            origin: origin.map(str::to_string),
            ts: self.clock.now(),
        };
        self.session.push(message, self.tokenizer.as_ref())?;
        self.maybe_observe()
    }

    /// Run the Observer now regardless of the threshold. Passing the
    /// run state lets a completed pipeline leave its 🟢 summary — also
    /// when the buffer has already been drained by an automatic pass.
    /// Returns the number of observations appended.
    ///
    /// On LLM failure nothing is written and the buffer is retained.
    pub fn observe_now(&mut self, run: Option<&RunState>) -> Result<usize> {
        let today = self.clock.today();
        let mut appended = 0;

        if !self.session.is_empty() {
            let observations = self.observer.compress(
                self.llm.as_ref(),
                &self.sanitizer,
                self.session.messages(),
                today,
                self.config.llm_deadline(),
            )?;
            for observation in &observations {
                self.log
                    .append(observation, WriteSource::Observer, self.clock.now())?;
                appended += 1;
            }
            self.session.clear()?;
        }

        if let Some(run) = run
            && let Some(summary) = Observer::run_summary(run, today)
        {
            self.log
                .append(&summary, WriteSource::Observer, self.clock.now())?;
            appended += 1;
        }

        if appended > 0 {
            debug!(appended, "observer pass complete");
            self.maybe_reflect()?;
        }
        Ok(appended)
    }

    /// Run the Reflector now regardless of the threshold. Returns true
    /// when the log was rewritten.
    pub fn reflect_now(&mut self) -> Result<bool> {
        self.reflector.consolidate(
            self.llm.as_ref(),
            &self.sanitizer,
            &self.log,
            self.clock.today(),
            self.clock.now(),
            self.config.llm_deadline(),
        )
    }

    /// Assemble Block 1 + Block 2. Verifies the audit hash before
    /// rendering; a tampered log renders nothing.
    pub fn build_context(&self) -> Result<String> {
        let today = self.clock.today();
        let observations = self.log.load(today)?;
        Ok(memory::build(&observations, self.session.messages(), today))
    }

    /// Score a candidate instruction against the anchor. Drift appends
    /// an automatic 🔴 observation; the caller decides whether to abort.
    pub fn check_instruction(&mut self, candidate: &str) -> Result<DriftCheck> {
        let check = self
            .anchor
            .check(candidate, self.config.anchor_drift_threshold);
        if !check.ok {
            warn!(
                overlap = check.overlap,
                threshold = check.threshold,
                "instruction drifted from anchor"
            );
            let cleaned = self.sanitizer.clean_internal(candidate);
            let body = format!(
                "Instruction drift detected (overlap {:.2} < {:.2}): {}",
                check.overlap, check.threshold, cleaned.text
            );
            let observation = Observation::new(Priority::Red, self.clock.today(), body);
            self.log
                .append(&observation, WriteSource::Anchor, self.clock.now())?;
        }
        Ok(check)
    }

    /// Append a caller-authored observation through the sanitize →
    /// provenance → append path.
    pub fn record_observation(&mut self, mut observation: Observation) -> Result<()> {
        let cleaned = match observation.trust {
            Trust::External => self.sanitizer.clean_external(&observation.body),
            Trust::Internal => self.sanitizer.clean_internal(&observation.body),
        };
        if cleaned.truncated() {
            observation.priority = Priority::Red;
        }
        observation.body = cleaned.text;
        self.log
            .append(&observation, WriteSource::Manual, self.clock.now())
    }

    fn maybe_observe(&mut self) -> Result<()> {
        if self.observer.should_run(self.session.token_count()) {
            self.observe_now(None)?;
        }
        Ok(())
    }

    fn maybe_reflect(&mut self) -> Result<()> {
        let log_tokens = self.log.size_tokens(self.tokenizer.as_ref())?;
        if self.reflector.should_run(log_tokens) {
            self.reflect_now()?;
        }
        Ok(())
    }
}
