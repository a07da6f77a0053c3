//! New-mail detection and notification
//!
//! The first time a mailbox is seen its highest UID becomes the baseline and
//! nothing is sent. On later checks every message above the baseline that is
//! not already `\Seen` produces one notification, and the baseline moves up
//! once those notifications are delivered. A change of UIDVALIDITY
//! invalidates the baseline and starts over.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use peaker_imap::MessageHeader;
use peaker_smtp::OutgoingMessage;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::template::{self, Binding, Template};
use crate::{AccountConfig, Config, CoreError, CoreResult, MailboxReader, MailboxSnapshot, Outbox, Tick};

/// Display name used on notifications
const SENDER_NAME: &str = "Peaker";

/// How long reading one account may take before it is given up for this check
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeenMark {
    uid_validity: Option<u32>,
    highest_uid: u32,
}

struct AccountWatch {
    account: AccountConfig,
    template: Template,
    marks: HashMap<String, SeenMark>,
}

impl AccountWatch {
    /// Messages of `snapshot` that still need a notification, oldest first.
    ///
    /// A mailbox seen for the first time, or with a new UIDVALIDITY, gets its
    /// baseline recorded and yields nothing.
    fn observe<'a>(&mut self, snapshot: &'a MailboxSnapshot) -> Vec<&'a MessageHeader> {
        let known = self.marks.get(&snapshot.mailbox).copied();

        let mark = match known {
            Some(mark) if mark.uid_validity == snapshot.uid_validity => mark,
            previous => {
                let highest = highest_uid(snapshot);
                if previous.is_some() {
                    warn!(
                        account = %self.account.name,
                        mailbox = %snapshot.mailbox,
                        "UIDVALIDITY changed, resetting baseline"
                    );
                } else {
                    debug!(
                        account = %self.account.name,
                        mailbox = %snapshot.mailbox,
                        "Baseline at UID {}",
                        highest
                    );
                }
                self.marks.insert(
                    snapshot.mailbox.clone(),
                    SeenMark {
                        uid_validity: snapshot.uid_validity,
                        highest_uid: highest,
                    },
                );
                return Vec::new();
            }
        };

        let mut fresh: Vec<&MessageHeader> = snapshot
            .messages
            .iter()
            .filter(|m| m.uid > mark.highest_uid && !m.is_read())
            .collect();
        fresh.sort_by_key(|m| m.uid);
        fresh
    }

    /// Move the mark of `mailbox` up to `uid`. It never moves down.
    fn settle(&mut self, mailbox: &str, uid: u32) {
        if let Some(mark) = self.marks.get_mut(mailbox) {
            mark.highest_uid = mark.highest_uid.max(uid);
        }
    }
}

fn highest_uid(snapshot: &MailboxSnapshot) -> u32 {
    snapshot.messages.iter().map(|m| m.uid).max().unwrap_or(0)
}

fn notification(
    config: &Config,
    watch: &AccountWatch,
    mailbox: &str,
    header: &MessageHeader,
) -> OutgoingMessage {
    let sender = header.from_display();
    let rendered = watch.template.render(&Binding {
        account: &watch.account.server.email,
        name: &watch.account.name,
        mailbox,
        email: &sender,
        subject: header.subject(),
        date: header.envelope.date.as_deref().unwrap_or_default(),
    });

    OutgoingMessage::new(&config.outbound.email, rendered.subject)
        .from_name(SENDER_NAME)
        .to(&config.recipient)
        .text(rendered.body)
}

/// Tick action checking every account and sending notifications for new mail
pub struct Watcher<R, O> {
    config: Arc<Config>,
    reader: R,
    outbox: O,
    accounts: Vec<AccountWatch>,
}

impl<R, O> Watcher<R, O>
where
    R: MailboxReader,
    O: Outbox,
{
    /// Create a watcher, resolving the template of every account.
    pub fn new(config: Arc<Config>, reader: R, outbox: O) -> CoreResult<Self> {
        let accounts = config
            .accounts
            .iter()
            .map(|account| {
                let template =
                    template::resolve(&account.template).map_err(|source| CoreError::Template {
                        account: account.name.clone(),
                        source,
                    })?;
                Ok(AccountWatch {
                    account: account.clone(),
                    template,
                    marks: HashMap::new(),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        if accounts.is_empty() {
            warn!("No accounts configured, nothing to watch");
        }

        Ok(Self {
            config,
            reader,
            outbox,
            accounts,
        })
    }

    /// Check all accounts once.
    ///
    /// Each account gets [`READ_TIMEOUT`] to deliver its snapshots. When a
    /// notification fails transiently, it and the newer mail of its mailbox
    /// are tried again on the next check. Returns `false` when the outbound
    /// server permanently rejects a notification.
    pub async fn check(&mut self, at: DateTime<Utc>) -> bool {
        info!("Checking {} accounts at {}", self.accounts.len(), at);

        let reader = &self.reader;
        let polls = self.accounts.iter().map(|watch| async move {
            let account = &watch.account;
            let read = reader.read(&account.server, &account.mailboxes);
            match time::timeout(READ_TIMEOUT, read).await {
                Ok(Ok(snapshots)) => Some(snapshots),
                Ok(Err(e)) => {
                    warn!(account = %account.name, "Checking account failed: {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        account = %account.name,
                        "Checking account timed out after {:?}",
                        READ_TIMEOUT
                    );
                    None
                }
            }
        });
        let results = join_all(polls).await;

        let config = &*self.config;
        let outbox = &self.outbox;
        for (watch, snapshots) in self.accounts.iter_mut().zip(results) {
            for snapshot in snapshots.iter().flatten() {
                let fresh = watch.observe(snapshot);
                if fresh.is_empty() {
                    watch.settle(&snapshot.mailbox, highest_uid(snapshot));
                    continue;
                }

                info!(
                    account = %watch.account.name,
                    mailbox = %snapshot.mailbox,
                    "{} new mails",
                    fresh.len()
                );

                let mut delivered_up_to = highest_uid(snapshot);
                for header in fresh {
                    let message = notification(config, watch, &snapshot.mailbox, header);
                    match outbox.send(message).await {
                        Ok(()) => {}
                        Err(e) if e.is_permanent() => {
                            error!("Sending notification failed permanently: {}", e);
                            return false;
                        }
                        Err(e) => {
                            warn!(
                                account = %watch.account.name,
                                mailbox = %snapshot.mailbox,
                                "Sending notification failed, retrying on the next check: {}",
                                e
                            );
                            delivered_up_to = header.uid - 1;
                            break;
                        }
                    }
                }
                watch.settle(&snapshot.mailbox, delivered_up_to);
            }
        }

        true
    }
}

#[async_trait]
impl<R, O> Tick for Watcher<R, O>
where
    R: MailboxReader,
    O: Outbox,
{
    async fn tick(&mut self, at: DateTime<Utc>) -> bool {
        self.check(at).await
    }
}
