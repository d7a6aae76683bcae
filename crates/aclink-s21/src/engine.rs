//! The S21 protocol engine.
//!
//! Owns the transport and all per-link state: negotiated version,
//! feature flags, discovered command set, active variant strategy, link
//! status, quality metrics, and recovery state.
//!
//! Every operation runs to completion on the caller's task. The S21
//! link is strictly half-duplex request/response with a single peer, so
//! there is no background reader; the only suspension points are the
//! transport reads, each bounded by an explicit timeout.
//!
//! Transaction shapes:
//!
//! ```text
//! set   (D class):  TX frame -> RX ACK
//! query (F/R class): TX frame -> RX ACK -> RX reply frame -> TX ACK
//! ```

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, trace, warn};

use aclink_core::transport::Transport;
use aclink_core::{Error, ErrorKind, Result};

use crate::discovery::{
    self, CommandSet, EXTENDED_PROBES, PROBE_TABLE, extended_reply_matches, probe_reply_matches,
};
use crate::frame::{self, S21Frame};
use crate::quality::{CommunicationQuality, ErrorRecoveryState, LinkStatus};
use crate::variant::{
    Variant, VariantDetector, VariantInfo, VariantStrategy, encode_frame_for, strategy_for,
    verify_dialect_checksum,
};
use crate::version::{
    Features, ProtocolVersion, parse_legacy_version_payload, parse_version_payload,
};

/// Base delay of the linearly increasing timeout-retry backoff.
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Fixed delay before retrying after a checksum/protocol failure.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(30);

/// Extra pacing delay applied when the link is degraded.
const ADAPTIVE_PACING_DELAY: Duration = Duration::from_millis(20);

/// Settle delay inside the recovery procedure.
const RECOVERY_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Read timeout used when draining stale input during recovery.
const FLUSH_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Latency ceiling for the recovery health check to count as passed.
const HEALTH_CHECK_LATENCY_LIMIT: Duration = Duration::from_secs(2);

/// Timing and retry configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Overall wait for a reply frame to begin.
    pub response_timeout: Duration,
    /// Maximum gap between bytes inside a frame. A frame that stalls
    /// mid-way aborts with a timeout even though the overall budget has
    /// not elapsed.
    pub inter_byte_timeout: Duration,
    /// Wait for the bare ACK/NAK confirmation byte.
    pub ack_timeout: Duration,
    /// Maximum additional attempts in the retry loop.
    pub max_retries: u32,
    /// Pause between discovery probes (device pacing).
    pub inter_command_delay: Duration,
    /// Whether to run the command-discovery probe pass at startup.
    pub discover_commands: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            response_timeout: Duration::from_millis(300),
            inter_byte_timeout: Duration::from_millis(50),
            ack_timeout: Duration::from_millis(100),
            max_retries: 3,
            inter_command_delay: Duration::from_millis(discovery::INTER_PROBE_DELAY_MS),
            discover_commands: true,
        }
    }
}

/// One outbound wire command, standard or extended form.
enum WireCommand {
    /// Two-character command with payload.
    Std(u8, u8, Vec<u8>),
    /// Four-character (v3) command with payload.
    Ext([u8; 4], Vec<u8>),
    /// The bare single-character model query of v0/v1 units.
    BareModel,
}

/// The S21 protocol engine.
///
/// One engine exclusively owns one transport. All mutable state lives
/// in the instance, so several engines can coexist (e.g. under test)
/// without interference.
pub struct S21Engine {
    transport: Box<dyn Transport>,
    config: EngineConfig,
    version: ProtocolVersion,
    features: Features,
    features_refined: bool,
    commands: CommandSet,
    active_variant: Variant,
    strategy: Box<dyn VariantStrategy>,
    detector: VariantDetector,
    model_code: Option<Vec<u8>>,
    status: LinkStatus,
    quality: CommunicationQuality,
    recovery: ErrorRecoveryState,
}

impl S21Engine {
    /// Create an engine over the given transport. No traffic occurs
    /// until [`initialize`](Self::initialize) or the first command.
    pub fn new(transport: Box<dyn Transport>, config: EngineConfig) -> Self {
        let recovery = ErrorRecoveryState::new(config.response_timeout);
        S21Engine {
            transport,
            config,
            version: ProtocolVersion::Unknown,
            features: Features::default(),
            features_refined: false,
            commands: CommandSet::default(),
            active_variant: Variant::Standard,
            strategy: strategy_for(Variant::Standard),
            detector: VariantDetector::new(),
            model_code: None,
            status: LinkStatus::default(),
            quality: CommunicationQuality::default(),
            recovery,
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The negotiated protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The current feature flags.
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Whether the feature flags have been refined by a capability
    /// query (as opposed to version seeding alone).
    pub fn features_refined(&self) -> bool {
        self.features_refined
    }

    /// Metadata of the active protocol variant.
    pub fn variant_info(&self) -> VariantInfo {
        self.strategy.info()
    }

    /// The active variant strategy (for value encoding at the adapter).
    pub fn strategy(&self) -> &dyn VariantStrategy {
        self.strategy.as_ref()
    }

    /// Current link status.
    pub fn link_status(&self) -> &LinkStatus {
        &self.status
    }

    /// Current communication-quality metrics.
    pub fn quality(&self) -> &CommunicationQuality {
        &self.quality
    }

    /// Current recovery state.
    pub fn recovery_state(&self) -> &ErrorRecoveryState {
        &self.recovery
    }

    /// The model code reported by the unit, if it was queried.
    pub fn model_code(&self) -> Option<&[u8]> {
        self.model_code.as_deref()
    }

    /// Whether a command passes both the version floor and, once
    /// discovery has run, the discovered bitmap.
    pub fn is_command_supported(&self, cmd0: u8, cmd1: u8) -> bool {
        self.commands.is_command_supported(self.version, cmd0, cmd1)
    }

    /// Replace the active variant strategy. All subsequent encode,
    /// decode, and checksum operations go through the new strategy.
    pub fn set_variant(&mut self, variant: Variant) {
        if variant != self.active_variant {
            debug!(from = %self.active_variant, to = %variant, "switching protocol variant");
            self.active_variant = variant;
            self.strategy = strategy_for(variant);
        }
    }

    /// Consume the engine, returning the transport.
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }

    // -----------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------

    /// Run startup negotiation: version cascade, feature seeding and
    /// refinement, variant detection, and command discovery.
    ///
    /// Never fails outright: a unit that answers nothing settles on
    /// [`ProtocolVersion::Unknown`] and stays usable through the basic
    /// command set.
    pub async fn initialize(&mut self) -> Result<()> {
        self.negotiate().await;
        Ok(())
    }

    async fn negotiate(&mut self) {
        self.negotiate_version().await;

        let mut features = Features::default();
        features.seed_from_version(self.version);
        self.features = features;
        self.features_refined = false;

        self.refine_features().await;
        self.detect_variant().await;
        if self.config.discover_commands {
            self.discover_commands().await;
        }

        debug!(
            version = %self.version,
            variant = %self.active_variant,
            discovered = self.commands.supported_count(),
            "engine initialized"
        );
    }

    /// Version cascade: newest, most descriptive query first, then
    /// strictly older fallbacks. All failing settles on `Unknown`.
    async fn negotiate_version(&mut self) {
        // 1. v3 extended version query: exact major.minor.
        if let Some(version) = self.try_version_extended().await {
            self.version = version;
            return;
        }
        // 2. Legacy version query, frozen at v2 for anything newer.
        if let Some(version) = self.try_version_legacy().await {
            self.version = version;
            return;
        }
        // 3. Model-code query only v2 units answer.
        if let Some(version) = self.try_version_model_code().await {
            self.version = version;
            return;
        }
        // 4. Bare model query of the oldest units.
        if let Some(version) = self.try_version_bare_model().await {
            self.version = version;
            return;
        }
        debug!("all version queries failed, settling on unknown");
        self.version = ProtocolVersion::Unknown;
    }

    async fn try_version_extended(&mut self) -> Option<ProtocolVersion> {
        let reply = self
            .attempt(&WireCommand::Ext(*b"FY00", Vec::new()), true)
            .await
            .ok()??;
        if reply.cmd0 != b'G' || reply.cmd1 != b'Y' || reply.ext_tag() != Some(*b"00") {
            return None;
        }
        match parse_version_payload(reply.ext_payload()) {
            Ok((major, minor)) => {
                let version = ProtocolVersion::from_major_minor(major, minor);
                debug!(major, minor, %version, "extended version query answered");
                Some(version)
            }
            Err(e) => {
                trace!(error = %e, "extended version payload unparseable");
                None
            }
        }
    }

    async fn try_version_legacy(&mut self) -> Option<ProtocolVersion> {
        let reply = self
            .attempt(&WireCommand::Std(b'F', b'8', Vec::new()), true)
            .await
            .ok()??;
        if reply.cmd0 != b'G' || reply.cmd1 != b'8' {
            return None;
        }
        match parse_legacy_version_payload(&reply.payload) {
            Ok(version) => {
                debug!(%version, "legacy version query answered");
                Some(version)
            }
            Err(_) => None,
        }
    }

    async fn try_version_model_code(&mut self) -> Option<ProtocolVersion> {
        let reply = self
            .attempt(&WireCommand::Std(b'F', b'C', Vec::new()), true)
            .await
            .ok()??;
        if reply.cmd0 != b'G' || reply.cmd1 != b'C' || reply.payload.len() < 4 {
            return None;
        }
        self.model_code = Some(reply.payload.clone());
        debug!("model-code query answered, assuming v2");
        Some(ProtocolVersion::V2)
    }

    async fn try_version_bare_model(&mut self) -> Option<ProtocolVersion> {
        let reply = self.attempt(&WireCommand::BareModel, true).await.ok()??;
        if reply.cmd0 != b'M' {
            return None;
        }
        debug!("bare model query answered, assuming v1");
        Some(ProtocolVersion::V1)
    }

    /// Refine feature flags through the capability queries the
    /// negotiated version supports.
    async fn refine_features(&mut self) {
        if self.is_command_supported(b'F', b'2') {
            if let Ok(Some(reply)) = self
                .attempt(&WireCommand::Std(b'F', b'2', Vec::new()), true)
                .await
            {
                if reply.cmd0 == b'G' && reply.cmd1 == b'2' && reply.payload.len() >= 4 {
                    self.features.apply_features_bitmap(&reply.payload);
                    self.features_refined = true;
                    trace!(payload = ?reply.payload, "applied F2 feature bitmap");
                }
            }
        }
        if self.is_command_supported(b'F', b'K') {
            if let Ok(Some(reply)) = self
                .attempt(&WireCommand::Std(b'F', b'K', Vec::new()), true)
                .await
            {
                if reply.cmd0 == b'G' && reply.cmd1 == b'K' && reply.payload.len() >= 4 {
                    self.features.apply_secondary_bitmap(&reply.payload, self.version);
                    trace!(payload = ?reply.payload, "applied FK feature bitmap");
                }
            }
        }
    }

    /// Match the unit's identity bytes against the registered variant
    /// strategies. An identity nobody claims keeps the standard variant.
    async fn detect_variant(&mut self) {
        if self.model_code.is_none() && self.is_command_supported(b'F', b'C') {
            if let Ok(Some(reply)) = self
                .attempt(&WireCommand::Std(b'F', b'C', Vec::new()), true)
                .await
            {
                if reply.cmd0 == b'G' && reply.cmd1 == b'C' {
                    self.model_code = Some(reply.payload.clone());
                }
            }
        }
        if let Some(identity) = self.model_code.clone() {
            let variant = self.detector.detect(&identity);
            self.set_variant(variant);
        }
    }

    /// Probe the fixed command table, recording the supported bitmap,
    /// then probe the extended command family.
    async fn discover_commands(&mut self) {
        if self.version < ProtocolVersion::V2 {
            return;
        }
        for probe in PROBE_TABLE {
            if self.version < discovery::version_floor(probe.cmd[0], probe.cmd[1]) {
                continue;
            }
            sleep(self.config.inter_command_delay).await;
            let supported = matches!(
                self.attempt(&WireCommand::Std(probe.cmd[0], probe.cmd[1], Vec::new()), true)
                    .await,
                Ok(Some(ref reply)) if probe_reply_matches(probe.cmd, reply)
            );
            if supported {
                self.commands.mark_supported(probe.bit);
            }
            trace!(
                cmd = %String::from_utf8_lossy(&probe.cmd),
                supported,
                what = probe.description,
                "probed command"
            );
        }
        self.commands.mark_probed();

        if self.version.has_extended_commands() {
            for (index, sub_type) in EXTENDED_PROBES.iter().enumerate() {
                sleep(self.config.inter_command_delay).await;
                let cmd = [b'F', b'U', sub_type[0], sub_type[1]];
                let supported = matches!(
                    self.attempt(&WireCommand::Ext(cmd, Vec::new()), true).await,
                    Ok(Some(ref reply)) if extended_reply_matches(*sub_type, reply)
                );
                if supported {
                    self.commands.mark_extended_supported(index);
                }
            }
        }
        debug!(
            bitmap = format_args!("{:#06x}", self.commands.bitmap()),
            "command discovery complete"
        );
    }

    // -----------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------

    /// Send a query command and return its reply frame.
    ///
    /// Runs the full policy stack: support check, retry loop, quality
    /// tracking, and recovery triggering.
    pub async fn command(&mut self, cmd0: u8, cmd1: u8, payload: &[u8]) -> Result<S21Frame> {
        if !self.is_command_supported(cmd0, cmd1) {
            return Err(Error::CommandNotSupported(format!(
                "{}{}",
                cmd0 as char, cmd1 as char
            )));
        }
        let reply = self
            .execute(WireCommand::Std(cmd0, cmd1, payload.to_vec()), true)
            .await?;
        reply.ok_or(Error::Unknown)
    }

    /// Send a set command confirmed by a bare ACK (no reply frame).
    pub async fn set_command(&mut self, cmd0: u8, cmd1: u8, payload: &[u8]) -> Result<()> {
        if !self.is_command_supported(cmd0, cmd1) {
            return Err(Error::CommandNotSupported(format!(
                "{}{}",
                cmd0 as char, cmd1 as char
            )));
        }
        self.execute(WireCommand::Std(cmd0, cmd1, payload.to_vec()), false)
            .await?;
        Ok(())
    }

    /// Send an extended (4-character) query command.
    pub async fn ext_command(&mut self, cmd: [u8; 4], payload: &[u8]) -> Result<S21Frame> {
        if !self.version.has_extended_commands() {
            return Err(Error::CommandNotSupported(format!(
                "extended commands need v3, negotiated {}",
                self.version
            )));
        }
        let reply = self
            .execute(WireCommand::Ext(cmd, payload.to_vec()), true)
            .await?;
        reply.ok_or(Error::Unknown)
    }

    // -----------------------------------------------------------------
    // Transaction machinery
    // -----------------------------------------------------------------

    /// Bounded retry loop around one transaction.
    ///
    /// Continuation policy by error class: timeouts retry up to twice
    /// with linearly increasing delay; checksum/invalid-response/
    /// protocol failures retry once after a short fixed delay;
    /// `CommandNotSupported` and `InvalidParameter` never retry. The
    /// whole loop is additionally capped at `max_retries` extra
    /// attempts.
    async fn execute(
        &mut self,
        cmd: WireCommand,
        expect_reply: bool,
    ) -> Result<Option<S21Frame>> {
        let mut timeout_retries = 0u32;
        let mut transient_retries = 0u32;

        loop {
            // Adaptive pacing: give a struggling unit extra breathing room.
            if self.quality.avg_response_ms > 1000.0 || self.quality.quality_score < 50.0 {
                sleep(ADAPTIVE_PACING_DELAY).await;
            }

            let started = Instant::now();
            match self.attempt(&cmd, expect_reply).await {
                Ok(reply) => {
                    self.note_success(started.elapsed());
                    return Ok(reply);
                }
                Err(e) => {
                    let kind = e.kind();
                    let extra_attempts = timeout_retries + transient_retries;
                    let may_retry = e.is_retryable()
                        && extra_attempts < self.config.max_retries
                        && match kind {
                            ErrorKind::Timeout => timeout_retries < 2,
                            _ => transient_retries < 1,
                        };

                    if may_retry {
                        if kind == ErrorKind::Timeout {
                            timeout_retries += 1;
                            trace!(attempt = timeout_retries, "timeout, retrying");
                            sleep(TIMEOUT_RETRY_DELAY * timeout_retries).await;
                        } else {
                            transient_retries += 1;
                            trace!(?kind, "transient failure, retrying");
                            sleep(TRANSIENT_RETRY_DELAY).await;
                        }
                        continue;
                    }

                    // Deterministic rejections are surfaced without
                    // touching the failure trackers.
                    if e.is_retryable() {
                        self.note_failure(kind);
                        self.maybe_recover().await;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One transaction attempt: encode, send, collect ACK, optionally
    /// read and confirm the reply frame.
    async fn attempt(
        &mut self,
        cmd: &WireCommand,
        expect_reply: bool,
    ) -> Result<Option<S21Frame>> {
        let bytes = match cmd {
            WireCommand::Std(cmd0, cmd1, payload) => {
                let (c0, c1) = self.strategy.map_command(*cmd0, *cmd1);
                encode_frame_for(self.strategy.as_ref(), c0, c1, payload)?
            }
            WireCommand::Ext(cmd, payload) => frame::encode_ext_frame(*cmd, payload)?,
            WireCommand::BareModel => {
                vec![frame::STX, b'M', frame::checksum(&[b'M']), frame::ETX]
            }
        };

        self.transport.send(&bytes).await?;
        self.wait_ack().await?;

        if !expect_reply {
            return Ok(None);
        }

        let reply = self.read_frame(self.recovery.adaptive_timeout).await?;
        let (cmd0, cmd1) = self.strategy.map_response(reply.cmd0, reply.cmd1);
        Ok(Some(S21Frame {
            cmd0,
            cmd1,
            payload: reply.payload,
        }))
    }

    /// Wait for the single-byte transaction confirmation.
    async fn wait_ack(&mut self) -> Result<()> {
        match self.transport.read_byte(self.config.ack_timeout).await? {
            frame::ACK => Ok(()),
            frame::NAK => Err(Error::CommandNotSupported(
                "unit rejected command with NAK".into(),
            )),
            other => Err(Error::InvalidResponse(format!(
                "expected ACK, got 0x{other:02X}"
            ))),
        }
    }

    /// Read one complete frame: scan for the start marker within the
    /// overall budget, then collect bytes under the inter-byte timeout
    /// until the end marker. Verifies the dialect checksum and confirms
    /// receipt with an ACK byte.
    async fn read_frame(&mut self, overall: Duration) -> Result<S21Frame> {
        let deadline = Instant::now() + overall;
        let start_marker = self.strategy.start_marker();
        let end_marker = self.strategy.end_marker();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            let byte = self.transport.read_byte(remaining).await?;
            if byte == start_marker {
                break;
            }
            trace!(byte = format_args!("0x{byte:02X}"), "discarding stray byte");
        }

        let mut buf = vec![start_marker];
        loop {
            let byte = self.transport.read_byte(self.config.inter_byte_timeout).await?;
            buf.push(byte);
            if buf.len() > frame::MAX_FRAME_LEN {
                return Err(Error::BufferOverflow);
            }
            if byte == end_marker && buf.len() >= frame::MIN_FRAME_LEN {
                break;
            }
        }

        verify_dialect_checksum(self.strategy.as_ref(), &buf)?;

        let body = &buf[1..buf.len() - 2];
        let reply = S21Frame {
            cmd0: body[0],
            cmd1: body[1],
            payload: body[2..].to_vec(),
        };

        self.transport.send(&[frame::ACK]).await?;
        Ok(reply)
    }

    // -----------------------------------------------------------------
    // Tracking and recovery
    // -----------------------------------------------------------------

    fn note_success(&mut self, latency: Duration) {
        let now = Instant::now();
        self.recovery.record_success();
        self.status.record_success(now);
        self.quality
            .record_success(latency, self.recovery.consecutive_errors, now);
    }

    fn note_failure(&mut self, kind: ErrorKind) {
        let now = Instant::now();
        self.recovery.record_failure();
        self.status.record_failure(kind);
        self.quality
            .record_failure(kind, self.recovery.consecutive_errors, now);
    }

    /// Run the recovery procedure when the consecutive-failure streak
    /// or the quality score says the link is in trouble.
    async fn maybe_recover(&mut self) {
        if self.recovery.in_recovery {
            return;
        }
        if self.recovery.needs_recovery() || self.quality.needs_recovery() {
            self.run_recovery().await;
        }
    }

    /// The bounded recovery procedure: flush stale input, settle, clear
    /// sticky error flags, widen the adaptive timeout on repeated
    /// attempts, then health-check with one minimal status query.
    async fn run_recovery(&mut self) {
        self.recovery.in_recovery = true;
        debug!(
            consecutive = self.recovery.consecutive_errors,
            attempts = self.recovery.recovery_attempts,
            score = self.quality.quality_score,
            "entering link recovery"
        );

        self.flush_input().await;
        sleep(RECOVERY_SETTLE_DELAY).await;
        self.status.clear_error_flags();
        if self.recovery.recovery_attempts > 0 {
            self.recovery.widen_timeout();
        }
        self.recovery.last_recovery = Some(Instant::now());

        let started = Instant::now();
        let healthy = matches!(
            self.attempt(&WireCommand::Std(b'F', b'1', Vec::new()), true).await,
            Ok(Some(ref reply))
                if reply.cmd0 == b'G'
                    && reply.cmd1 == b'1'
                    && reply.payload.len() >= 4
                    && started.elapsed() < HEALTH_CHECK_LATENCY_LIMIT
        );

        if healthy {
            debug!("recovery health check passed");
            self.recovery.record_success();
            self.status.connected = true;
        } else {
            self.recovery.recovery_attempts += 1;
            warn!(
                attempts = self.recovery.recovery_attempts,
                "recovery health check failed"
            );
            if self.recovery.reset_due() {
                self.full_reset().await;
            }
        }
        self.recovery.in_recovery = false;
    }

    /// Drain whatever is sitting in the receive path.
    async fn flush_input(&mut self) {
        let mut buf = [0u8; 32];
        loop {
            match self.transport.receive(&mut buf, FLUSH_READ_TIMEOUT).await {
                Ok(n) if n > 0 => {
                    trace!(bytes = n, "flushed stale input");
                }
                _ => break,
            }
        }
    }

    /// Full reset: clear every piece of engine state and re-run the
    /// startup negotiation from scratch.
    async fn full_reset(&mut self) {
        warn!("recovery budget exhausted, performing full engine reset");
        self.version = ProtocolVersion::Unknown;
        self.features = Features::default();
        self.features_refined = false;
        self.commands.clear();
        self.active_variant = Variant::Standard;
        self.strategy = strategy_for(Variant::Standard);
        self.model_code = None;
        self.status = LinkStatus::default();
        self.quality = CommunicationQuality::default();
        self.recovery.reset();
        self.negotiate().await;
    }
}

#[cfg(test)]
impl S21Engine {
    /// Pin the negotiated version directly, skipping the wire cascade.
    pub(crate) fn force_version_for_tests(&mut self, version: ProtocolVersion) {
        self.version = version;
    }
}
