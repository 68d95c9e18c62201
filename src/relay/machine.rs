//! The streaming state machine

use super::{RelayConfig, RelayEvent, RelayState, SessionReport, StreamSession, Termination, NO_DATA_ERROR};
use crate::api::{parse_upstream_line, LineStream, UpstreamLine};
use crate::metrics::MetricsTracker;
use crate::store::MessageStore;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// Drives a session from an open upstream stream to its single persisted outcome
pub struct Relay {
    store: Arc<dyn MessageStore>,
    config: RelayConfig,
    metrics: Option<MetricsTracker>,
}

impl Relay {
    pub fn new(store: Arc<dyn MessageStore>, config: RelayConfig) -> Self {
        Self {
            store,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsTracker) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Deadline for a session starting now
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.config.stream_timeout
    }

    /// Relay an open upstream stream until it ends, then persist and emit the
    /// terminal event. The upstream is dropped before persisting.
    pub async fn stream(
        &self,
        mut session: StreamSession,
        mut lines: LineStream,
        downstream: &mpsc::Sender<RelayEvent>,
        deadline: Instant,
    ) -> SessionReport {
        session.begin_streaming();
        let termination = self.pump(&mut session, &mut lines, downstream, deadline).await;
        drop(lines);
        self.conclude(session, termination, downstream).await
    }

    async fn pump(
        &self,
        session: &mut StreamSession,
        lines: &mut LineStream,
        downstream: &mpsc::Sender<RelayEvent>,
        deadline: Instant,
    ) -> Termination {
        let inactivity = self.config.inactivity_timeout;
        let expiry = sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            let line = tokio::select! {
                biased;
                _ = downstream.closed() => return Termination::Disconnected,
                _ = &mut expiry => return Termination::DeadlineExceeded,
                next = timeout(inactivity, lines.next()) => match next {
                    Err(_) => {
                        warn!(message_id = session.message_id(), ?inactivity, "Upstream sent nothing within the inactivity timeout");
                        return Termination::Stalled;
                    }
                    Ok(None) => return Termination::Closed,
                    Ok(Some(Err(e))) => return Termination::Failed(e.to_string()),
                    Ok(Some(Ok(line))) => line,
                },
            };

            match parse_upstream_line(&line) {
                UpstreamLine::KeepAlive => {
                    if session.idle_for() > inactivity {
                        warn!(
                            message_id = session.message_id(),
                            idle = ?session.idle_for(),
                            "Only keep-alives past the inactivity timeout"
                        );
                        return Termination::Stalled;
                    }
                }
                UpstreamLine::Ignored => {}
                UpstreamLine::Done => return Termination::Done,
                UpstreamLine::Empty => session.touch(),
                UpstreamLine::Malformed(reason) => {
                    warn!(message_id = session.message_id(), %reason, "Skipping malformed upstream line");
                }
                UpstreamLine::Delta(delta) => {
                    session.append(&delta);
                    // a consumer that stops reading must not outlive the deadline
                    tokio::select! {
                        biased;
                        sent = downstream.send(RelayEvent::Message(delta)) => {
                            if sent.is_err() {
                                return Termination::Disconnected;
                            }
                        }
                        _ = &mut expiry => {
                            warn!(message_id = session.message_id(), "Consumer stopped reading before the deadline");
                            return Termination::DeadlineExceeded;
                        }
                    }
                }
            }
        }
    }

    /// Persist the outcome for `termination` and emit the matching terminal event
    pub async fn conclude(
        &self,
        session: StreamSession,
        termination: Termination,
        downstream: &mpsc::Sender<RelayEvent>,
    ) -> SessionReport {
        let failure = match &termination {
            Termination::Done | Termination::Closed | Termination::Stalled
                if session.has_text() =>
            {
                None
            }
            Termination::Stalled => Some((RelayState::Timeout, NO_DATA_ERROR.to_string())),
            Termination::Done | Termination::Closed => {
                Some((RelayState::Error, NO_DATA_ERROR.to_string()))
            }
            Termination::Rejected { status, body } if body.trim().is_empty() => {
                Some((RelayState::Error, format!("upstream returned {}", status)))
            }
            Termination::Rejected { status, body } => Some((
                RelayState::Error,
                format!("upstream returned {}: {}", status, body.trim()),
            )),
            Termination::Failed(reason) => Some((RelayState::Error, reason.clone())),
            Termination::Disconnected => {
                Some((RelayState::Error, "client disconnected".to_string()))
            }
            Termination::DeadlineExceeded => Some((
                RelayState::Timeout,
                format!(
                    "stream exceeded the {}s limit",
                    self.config.stream_timeout.as_secs()
                ),
            )),
        };

        let report = match failure {
            None => {
                let text = session.text().to_string();
                let report = session
                    .finish(RelayState::Done, text.clone(), termination, self.store.as_ref())
                    .await;
                self.emit_terminal(downstream, RelayEvent::Done(text), &report.message_id)
                    .await;
                info!(
                    message_id = %report.message_id,
                    chars = report.streamed_chars,
                    termination = ?report.termination,
                    "Relay session completed"
                );
                report
            }
            Some((state, reason)) => {
                let report = session
                    .finish(state, format!("Error: {}", reason), termination, self.store.as_ref())
                    .await;
                self.emit_terminal(downstream, RelayEvent::Error(reason.clone()), &report.message_id)
                    .await;
                warn!(
                    message_id = %report.message_id,
                    %state,
                    %reason,
                    "Relay session failed"
                );
                report
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_session(&report.termination, report.had_content, report.streamed_chars);
        }
        report
    }

    /// The outcome is already persisted; a consumer that neither reads nor
    /// disconnects gets one inactivity period to take the event.
    async fn emit_terminal(
        &self,
        downstream: &mpsc::Sender<RelayEvent>,
        event: RelayEvent,
        message_id: &str,
    ) {
        let name = event.event_name();
        match downstream
            .send_timeout(event, self.config.inactivity_timeout)
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Closed(_)) => {
                debug!(message_id, event = name, "Consumer gone before terminal event");
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(message_id, event = name, "Consumer not reading, terminal event dropped");
            }
        }
    }
}
