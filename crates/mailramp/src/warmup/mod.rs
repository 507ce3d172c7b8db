//! Warmup orchestration.
//!
//! The engine owns the ramp state machine: which warmup day is active,
//! whether today's batch already ran, the paced batch send itself,
//! deferred delivery checks, and the daily statistics rollup. The current
//! warmup day is derived from the first execution date rather than stored,
//! so the ramp is self-relative to first use.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::content::ContentGenerator;
use crate::db::{
    self, execution_repo, identity_repo, message_repo, schedule_repo, stats_repo, Database,
};
use crate::error::Result;
use crate::mailbox::MailboxChecker;
use crate::provider::MailSender;
use crate::secrets::CredentialCipher;
use crate::types::{ContentCategory, DeliveryStatus, SendStatus};

pub mod scheduler;

/// Maximum pending messages examined per check sweep, bounding the number
/// of mailbox sessions opened in one pass.
pub const CHECK_BATCH_LIMIT: u32 = 50;

/// Folders a simulated reader may file an inbox message into.
const ENGAGEMENT_FOLDERS: [&str; 3] = ["Archive", "Important", "Work"];

/// Outer probability that an inbox message gets any engagement at all.
const ENGAGEMENT_GATE: f64 = 0.7;

/// Probability of marking an engaged message as read.
const READ_PROBABILITY: f64 = 0.8;

/// Probability of filing an engaged message into a folder.
const MOVE_PROBABILITY: f64 = 0.3;

/// Address pools and pacing knobs the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct WarmupSettings {
    pub sender_addresses: Vec<String>,
    pub recipient_addresses: Vec<String>,
    pub min_send_delay_secs: u64,
    pub max_send_delay_secs: u64,
    pub check_delay_minutes: i64,
}

impl WarmupSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sender_addresses: config.sender_addresses.clone(),
            recipient_addresses: config.recipient_addresses.clone(),
            min_send_delay_secs: config.min_send_delay_secs,
            max_send_delay_secs: config.max_send_delay_secs,
            check_delay_minutes: config.check_delay_minutes,
        }
    }
}

/// Why a batch invocation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyCompleted,
    NoScheduleForToday,
    NoAddressesConfigured,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyCompleted => write!(f, "already executed today"),
            SkipReason::NoScheduleForToday => write!(f, "no schedule entry for today"),
            SkipReason::NoAddressesConfigured => write!(f, "no addresses configured"),
        }
    }
}

/// Result of a daily batch invocation. Skips are expected outcomes, not
/// errors: the trigger fires every day regardless of the ramp state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum BatchOutcome {
    Skipped {
        reason: SkipReason,
    },
    Completed {
        sent_count: u32,
        target_count: u32,
        failed_count: u32,
    },
}

/// Result of a manual send outside the schedule gate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ManualSendOutcome {
    Skipped { reason: SkipReason },
    Completed { success_count: u32, total_count: u32 },
}

/// Result of a pending-check sweep.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    /// Messages whose mailbox was actually inspected.
    pub checked: u32,
}

/// Read-only aggregate of warmup state for dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupProgress {
    pub current_day: u32,
    pub total_days: u64,
    pub total_sent: u64,
    pub total_inbox: u64,
    pub total_spam: u64,
    pub overall_success_rate: f64,
    pub overall_spam_rate: f64,
    pub recent_executions: Vec<execution_repo::ExecutionRow>,
    pub recent_statistics: Vec<stats_repo::DailyStatRow>,
}

/// The warmup orchestrator. Sole writer of executions and messages;
/// statistics are a derived view it recomputes after every mutation pass.
pub struct WarmupEngine {
    db: Database,
    settings: WarmupSettings,
    sender: Arc<dyn MailSender>,
    checker: Arc<dyn MailboxChecker>,
    generator: Arc<dyn ContentGenerator>,
    cipher: Option<CredentialCipher>,
    rng: StdRng,
}

impl WarmupEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        settings: WarmupSettings,
        sender: Arc<dyn MailSender>,
        checker: Arc<dyn MailboxChecker>,
        generator: Arc<dyn ContentGenerator>,
        cipher: Option<CredentialCipher>,
        rng: StdRng,
    ) -> Self {
        Self {
            db,
            settings,
            sender,
            checker,
            generator,
            cipher,
            rng,
        }
    }

    /// The database handle, for read-only consumers (dashboards, CRUD).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Current warmup day, 1-based, anchored on the first execution date.
    pub fn current_warmup_day(&self) -> Result<u32> {
        let first = match execution_repo::first_date(&self.db)? {
            Some(date) => date,
            None => return Ok(1),
        };

        let first_date = match NaiveDate::parse_from_str(&first, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                warn!("Unparseable first execution date '{}': {}", first, e);
                return Ok(1);
            }
        };

        let days_since_start = (db::today_utc() - first_date).num_days();
        Ok((days_since_start + 1).max(1) as u32)
    }

    /// The enabled schedule entry matching the current warmup day, if any.
    pub fn today_schedule(&self) -> Result<Option<schedule_repo::ScheduleDayRow>> {
        let day = self.current_warmup_day()?;
        Ok(schedule_repo::find_enabled_by_day(&self.db, day)?)
    }

    /// Whether the daily batch should run now: false once today's
    /// execution is complete or when the ramp has no entry for today.
    pub fn should_send_today(&self) -> Result<bool> {
        let today = db::date_str(db::today_utc());

        if let Some(execution) = execution_repo::find_by_date(&self.db, &today)? {
            if execution.is_complete() {
                debug!("Batch already completed today");
                return Ok(false);
            }
        }

        if self.today_schedule()?.is_none() {
            debug!("No schedule entry for the current warmup day");
            return Ok(false);
        }

        Ok(true)
    }

    /// Sends today's batch. Safe to invoke repeatedly: a completed day is
    /// skipped, and the sent counter is persisted per message so an
    /// interrupted batch leaves an accurate count behind.
    pub async fn send_daily_batch(&mut self) -> Result<BatchOutcome> {
        info!("Starting daily warmup batch");

        let schedule = match self.today_schedule()? {
            Some(schedule) => schedule,
            None => {
                warn!("No schedule entry for the current warmup day");
                return Ok(BatchOutcome::Skipped {
                    reason: SkipReason::NoScheduleForToday,
                });
            }
        };

        let today = db::date_str(db::today_utc());
        let existing = execution_repo::find_by_date(&self.db, &today)?;
        if let Some(execution) = &existing {
            if execution.is_complete() {
                info!("Already executed today");
                return Ok(BatchOutcome::Skipped {
                    reason: SkipReason::AlreadyCompleted,
                });
            }
        }

        let senders = self.settings.sender_addresses.clone();
        let recipients = self.settings.recipient_addresses.clone();
        if senders.is_empty() || recipients.is_empty() {
            error!("No sender or recipient addresses configured");
            return Ok(BatchOutcome::Skipped {
                reason: SkipReason::NoAddressesConfigured,
            });
        }

        let execution_id = match existing {
            Some(execution) => execution.id,
            None => execution_repo::create(&self.db, schedule.id, &today)?,
        };

        let target = schedule.target_emails;
        info!("Target emails for today: {}", target);

        let mut failed = 0u32;
        for i in 0..target {
            if !self.dispatch_one(&senders, &recipients).await? {
                failed += 1;
            }
            execution_repo::increment_sent(&self.db, execution_id)?;

            if i + 1 < target {
                self.pace().await;
            }
        }

        execution_repo::complete(&self.db, execution_id, &db::now_rfc3339())?;

        let sent_count = execution_repo::find_by_date(&self.db, &today)?
            .map(|e| e.sent_count)
            .unwrap_or(target);
        info!("Daily batch complete: {} emails sent", sent_count);

        self.update_daily_statistics()?;

        Ok(BatchOutcome::Completed {
            sent_count,
            target_count: target,
            failed_count: failed,
        })
    }

    /// Sends `count` messages outside the schedule gate.
    pub async fn trigger_manual_send(
        &mut self,
        count: u32,
        senders: Option<Vec<String>>,
        recipients: Option<Vec<String>>,
    ) -> Result<ManualSendOutcome> {
        info!("Manual send triggered: {} emails", count);

        let senders = senders
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.settings.sender_addresses.clone());
        let recipients = recipients
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.settings.recipient_addresses.clone());

        if senders.is_empty() || recipients.is_empty() {
            error!("No sender or recipient addresses configured");
            return Ok(ManualSendOutcome::Skipped {
                reason: SkipReason::NoAddressesConfigured,
            });
        }

        let mut success_count = 0u32;
        for i in 0..count {
            if self.dispatch_one(&senders, &recipients).await? {
                success_count += 1;
            }
            if i + 1 < count {
                self.pace().await;
            }
        }

        self.update_daily_statistics()?;

        info!("Manual send complete: {}/{} successful", success_count, count);
        Ok(ManualSendOutcome::Completed {
            success_count,
            total_count: count,
        })
    }

    /// Picks sender, recipient and category, generates content, submits
    /// the message and persists its record. Provider failures are recorded
    /// on the row; only database errors propagate.
    async fn dispatch_one(&mut self, senders: &[String], recipients: &[String]) -> Result<bool> {
        // Pools are checked by the callers; empty slices cannot pick.
        let (Some(sender), Some(recipient)) = (
            senders.choose(&mut self.rng),
            recipients.choose(&mut self.rng),
        ) else {
            return Ok(false);
        };
        let category = ContentCategory::ALL
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(ContentCategory::Mixed);

        let content = self.generator.generate(category).await;
        let outcome = self
            .sender
            .send(sender, recipient, &content.subject, &content.body)
            .await;

        let now = Utc::now();
        let record = message_repo::NewMessage {
            sender: sender.clone(),
            recipient: recipient.clone(),
            subject: content.subject,
            body: content.body,
            category,
            provider_message_id: outcome.provider_message_id,
            send_status: if outcome.success {
                SendStatus::Sent
            } else {
                SendStatus::Failed
            },
            sent_at: now.to_rfc3339(),
            check_scheduled_at: (now
                + ChronoDuration::minutes(self.settings.check_delay_minutes))
            .to_rfc3339(),
        };
        message_repo::insert(&self.db, &record)?;

        Ok(outcome.success)
    }

    /// Sleeps a random duration between sends so the traffic does not look
    /// machine-generated and stays under provider rate limits.
    async fn pace(&mut self) {
        let min = self.settings.min_send_delay_secs as f64;
        let max = self.settings.max_send_delay_secs as f64;
        let delay = if max <= min {
            min
        } else {
            self.rng.gen_range(min..max)
        };
        if delay > 0.0 {
            debug!("Waiting {:.2}s before next send", delay);
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    /// Checks the delivery status of due pending messages, at most
    /// [`CHECK_BATCH_LIMIT`] per sweep. Per-message failures never abort
    /// the sweep.
    pub async fn check_pending_emails(&mut self) -> Result<CheckReport> {
        let now = db::now_rfc3339();
        let due = message_repo::due_for_check(&self.db, &now, CHECK_BATCH_LIMIT)?;

        if due.is_empty() {
            debug!("No pending emails to check");
            return Ok(CheckReport { checked: 0 });
        }

        info!("Checking {} pending emails", due.len());

        let mut checked = 0u32;
        for message in due {
            let credential = match self.recipient_credential(&message.recipient)? {
                Some(credential) => credential,
                None => {
                    warn!("No mailbox credential for {}", message.recipient);
                    message_repo::mark_checked(
                        &self.db,
                        message.id,
                        DeliveryStatus::Unknown,
                        &db::now_rfc3339(),
                    )?;
                    continue;
                }
            };

            let outcome = self
                .checker
                .check(
                    &message.recipient,
                    &credential,
                    message.provider_message_id.as_deref(),
                    Some(&message.subject),
                )
                .await;

            message_repo::mark_checked(
                &self.db,
                message.id,
                outcome.status,
                &db::now_rfc3339(),
            )?;

            if outcome.status == DeliveryStatus::Inbox && self.rng.gen_bool(ENGAGEMENT_GATE) {
                self.simulate_engagement(&message, &credential).await?;
            }

            checked += 1;
        }

        info!("Checked {} emails", checked);
        self.update_daily_statistics()?;

        Ok(CheckReport { checked })
    }

    /// Probabilistically marks an inbox message read and files it into a
    /// folder, imitating a human reader. Both actions are best-effort.
    async fn simulate_engagement(
        &mut self,
        message: &message_repo::MessageRow,
        credential: &SecretString,
    ) -> Result<()> {
        let mut is_read = false;
        let mut moved: Option<&str> = None;

        if self.rng.gen_bool(READ_PROBABILITY)
            && self
                .checker
                .mark_read(&message.recipient, credential, &message.subject)
                .await
        {
            is_read = true;
        }

        if self.rng.gen_bool(MOVE_PROBABILITY) {
            let folder = ENGAGEMENT_FOLDERS
                .choose(&mut self.rng)
                .copied()
                .unwrap_or("Archive");
            if self
                .checker
                .move_to_folder(&message.recipient, credential, folder, &message.subject)
                .await
            {
                moved = Some(folder);
            }
        }

        if is_read || moved.is_some() {
            message_repo::record_engagement(&self.db, message.id, is_read, moved)?;
        }

        Ok(())
    }

    /// Looks up and decrypts the stored IMAP credential for a recipient.
    /// Missing identity, missing credential, or an unconfigured cipher all
    /// mean "no credential on file".
    fn recipient_credential(&self, recipient: &str) -> Result<Option<SecretString>> {
        let Some(cipher) = &self.cipher else {
            return Ok(None);
        };
        let Some(identity) = identity_repo::find_by_email(&self.db, recipient)? else {
            return Ok(None);
        };
        let Some(encrypted) = identity.imap_credential else {
            return Ok(None);
        };

        match cipher.decrypt(&encrypted) {
            Ok(plain) => Ok(Some(SecretString::from(plain))),
            Err(e) => {
                warn!("Failed to decrypt credential for {}: {}", recipient, e);
                Ok(None)
            }
        }
    }

    /// Recomputes today's statistics row wholesale from the message table.
    /// Idempotent; the statistics are a derived view, never a source of
    /// truth.
    pub fn update_daily_statistics(&self) -> Result<()> {
        let today = db::today_utc();
        let counts = message_repo::day_counts(&self.db, today)?;
        stats_repo::upsert(&self.db, &db::date_str(today), &counts)?;

        let (success_rate, _) = stats_repo::derive_rates(&counts);
        info!(
            "Updated statistics for {}: {} sent, {:.1}% success",
            db::date_str(today),
            counts.sent,
            success_rate
        );
        Ok(())
    }

    /// Read-only warmup progress aggregate.
    pub fn warmup_progress(&self) -> Result<WarmupProgress> {
        let current_day = self.current_warmup_day()?;
        let total_days = schedule_repo::count_enabled(&self.db)?;
        let totals = message_repo::totals(&self.db)?;

        let (overall_success_rate, overall_spam_rate) = if totals.sent > 0 {
            (
                round2(totals.inbox as f64 / totals.sent as f64 * 100.0),
                round2(totals.spam as f64 / totals.sent as f64 * 100.0),
            )
        } else {
            (0.0, 0.0)
        };

        Ok(WarmupProgress {
            current_day,
            total_days,
            total_sent: totals.sent,
            total_inbox: totals.inbox,
            total_spam: totals.spam,
            overall_success_rate,
            overall_spam_rate,
            recent_executions: execution_repo::recent(&self.db, 7)?,
            recent_statistics: stats_repo::recent(&self.db, 7)?,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
