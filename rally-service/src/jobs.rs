// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Periodic jobs run by the background scheduler.
//!
//! Each job is a function over the store: it selects the due work, records the idempotency
//! keys inside the transaction and only then dispatches the emails. Running a job twice in a
//! row therefore sends nothing new.

use time::{Duration, OffsetDateTime};

use std::collections::BTreeMap;

use rally_model::{Poll, TaskStatus, User, UserId};
use rally_storage::Store;

use crate::{
    error::Error,
    mailer::{DynMailer, OutgoingEmail},
};

/// How far ahead deadline reminders look.
const REMINDER_LOOKAHEAD: Duration = Duration::hours(24);
/// Pause before a task is reminded about again for the same deadline.
const REMINDER_COOLDOWN: Duration = Duration::hours(12);

/// The notification jobs.
#[derive(Clone)]
pub struct NotificationJobs {
    store: Store,
    mailer: DynMailer,
}

fn should_notify(user: &User) -> bool {
    user.is_active && !user.email.is_empty() && user.email_notifications_enabled
}

struct ReminderEntry {
    task_title: String,
    list_title: String,
    event_title: String,
    due_at: OffsetDateTime,
}

impl NotificationJobs {
    /// Creates the jobs over a store and a mail sink.
    pub fn new(store: Store, mailer: DynMailer) -> Self {
        Self { store, mailer }
    }

    /// Reminds assignees and event owners about deadlines within the next 24 hours.
    ///
    /// Returns the number of dispatched emails.
    pub async fn send_deadline_reminders(&self) -> Result<usize, Error> {
        let now = rally_common::time::now_utc();
        let window_end = now + REMINDER_LOOKAHEAD;
        let cooldown_threshold = now - REMINDER_COOLDOWN;

        let recipient_map: BTreeMap<UserId, (User, Vec<ReminderEntry>)> = self
            .store
            .transaction(move |tables| {
                let due_ids: Vec<_> = tables
                    .tasks
                    .values()
                    .filter(|t| matches!(t.status, TaskStatus::Todo | TaskStatus::Doing))
                    .filter(|t| matches!(t.due_at, Some(due) if due >= now && due <= window_end))
                    .filter(|t| {
                        t.deadline_reminder_sent_at.map_or(true, |sent| sent < cooldown_threshold)
                            || t.deadline_reminder_for_due_at != t.due_at
                    })
                    .map(|t| t.id)
                    .collect();

                let mut recipients: BTreeMap<UserId, (User, Vec<ReminderEntry>)> = BTreeMap::new();
                for id in due_ids {
                    let task = tables.tasks.get(id).expect("selected above");
                    let list = match tables.task_lists.get(task.list) {
                        Some(list) => list,
                        None => continue,
                    };
                    let event = match tables.events.get(list.event) {
                        Some(event) => event,
                        None => continue,
                    };
                    let due_at = task.due_at.expect("selected above");

                    let mut to_users: Vec<&User> = Vec::new();
                    if let Some(assignee) = task.assignee.and_then(|p| tables.participants.get(p)) {
                        if let Some(user) = tables.users.get(assignee.user).filter(|u| should_notify(u)) {
                            to_users.push(user);
                        }
                    }
                    if let Some(owner) = tables.users.get(event.owner).filter(|u| should_notify(u)) {
                        if to_users.iter().all(|u| u.id != owner.id) {
                            to_users.push(owner);
                        }
                    }
                    if to_users.is_empty() {
                        continue;
                    }

                    let entries: Vec<(UserId, User)> =
                        to_users.into_iter().map(|u| (u.id, u.clone())).collect();
                    let task_title = task.title.clone();
                    let list_title = list.title.clone();
                    let event_title = event.title.clone();

                    for (user_id, user) in entries {
                        recipients
                            .entry(user_id)
                            .or_insert_with(|| (user.clone(), Vec::new()))
                            .1
                            .push(ReminderEntry {
                                task_title: task_title.clone(),
                                list_title: list_title.clone(),
                                event_title: event_title.clone(),
                                due_at,
                            });
                    }

                    let task = tables.tasks.get_mut(id).expect("selected above");
                    task.deadline_reminder_sent_at = Some(now);
                    task.deadline_reminder_for_due_at = task.due_at;
                }
                Ok::<_, Error>(recipients)
            })
            .await?;

        let mut emails_sent = 0;
        for (_, (user, entries)) in recipient_map {
            let mut body = String::from("Deadlines coming up within 24 hours:\n");
            for entry in &entries {
                body.push_str(&format!(
                    "- {} ({} / {}), due {}\n",
                    entry.task_title,
                    entry.event_title,
                    entry.list_title,
                    rally_common::time::format_rfc3339(&entry.due_at),
                ));
            }
            if let Err(e) = self
                .mailer
                .send(OutgoingEmail {
                    to: user.email.clone(),
                    subject: "Upcoming task deadlines".to_string(),
                    body,
                })
                .await
            {
                log::warn!("deadline reminder to `{}` failed: {}", user.email, e);
                continue;
            }
            emails_sent += 1;
        }
        Ok(emails_sent)
    }

    /// Sends a result summary for every poll whose voting has closed and that has not been
    /// announced for its current `end_at` yet.
    ///
    /// Returns the number of dispatched emails.
    pub async fn send_poll_closing_notifications(&self) -> Result<usize, Error> {
        let now = rally_common::time::now_utc();

        let outbox: Vec<(User, String, String)> = self
            .store
            .transaction(move |tables| {
                let closed_ids: Vec<_> = tables
                    .polls
                    .values()
                    .filter(|p| p.is_voting_closed(now))
                    .filter(|p| {
                        !(p.closing_notification_sent_at.is_some()
                            && p.closing_notification_for_end_at == p.end_at)
                    })
                    .map(|p| p.id)
                    .collect();

                let mut outbox = Vec::new();
                for id in closed_ids {
                    let poll = tables.polls.get(id).expect("selected above");
                    let event = match tables.events.get(poll.event) {
                        Some(event) => event,
                        None => continue,
                    };

                    let mut recipients: BTreeMap<UserId, User> = BTreeMap::new();
                    if let Some(owner) = tables.users.get(event.owner).filter(|u| should_notify(u)) {
                        recipients.insert(owner.id, owner.clone());
                    }
                    for participant in tables.participants_of_event(event.id) {
                        if let Some(user) = tables.users.get(participant.user).filter(|u| should_notify(u)) {
                            recipients.insert(user.id, user.clone());
                        }
                    }
                    if recipients.is_empty() {
                        continue;
                    }

                    let body = summarize_poll(tables, poll);
                    let subject = format!("Poll results: {}", poll.question);
                    for (_, user) in recipients {
                        outbox.push((user, subject.clone(), body.clone()));
                    }

                    let poll = tables.polls.get_mut(id).expect("selected above");
                    poll.closing_notification_sent_at = Some(now);
                    poll.closing_notification_for_end_at = poll.end_at;
                }
                Ok::<_, Error>(outbox)
            })
            .await?;

        let mut emails_sent = 0;
        for (user, subject, body) in outbox {
            if let Err(e) = self
                .mailer
                .send(OutgoingEmail {
                    to: user.email.clone(),
                    subject,
                    body,
                })
                .await
            {
                log::warn!("poll summary to `{}` failed: {}", user.email, e);
                continue;
            }
            emails_sent += 1;
        }
        Ok(emails_sent)
    }

    /// Daily digest slot. Wired into the schedule behind a config flag; the content is still
    /// to come, so it reports zero dispatched emails.
    pub async fn send_daily_digest(&self) -> Result<usize, Error> {
        Ok(0)
    }
}

fn summarize_poll(tables: &rally_storage::Tables, poll: &Poll) -> String {
    let mut body = format!("Voting has closed: {}\n", poll.question);
    let mut total = 0u64;
    for option in tables.options_of_poll(poll.id) {
        let votes = tables.votes_for_option(option.id);
        total += votes;
        let label = option
            .label
            .clone()
            .or_else(|| option.date_value.map(|d| d.to_string()))
            .unwrap_or_default();
        body.push_str(&format!("- {}: {} vote(s)\n", label, votes));
    }
    body.push_str(&format!("Total votes: {}\n", total));
    body
}
