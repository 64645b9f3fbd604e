//! Recursive action tree executor.
//!
//! Renders each subscriber action against the event context, parses it into
//! an [`ActionNode`], and executes the tree against the messaging backend.
//! Every backend call is routed through the owning session's send queue, so
//! `parallel` blocks are concurrent at this level while the backend still
//! sees strictly ordered traffic per session.
//!
//! Failure containment follows the action tree: a failed top-level action is
//! logged and its siblings continue; a failed `queue` item stops its block;
//! a failed `parallel` branch never cancels the others; a `retry` node is
//! the one place where leaf errors are expected and drive control flow.

use std::{sync::Arc, time::Duration};

use futures_util::future::{join_all, BoxFuture};
use hermod_core::{
    models::{EventEnvelope, SessionId, SharedClock},
    sink::ActionSink,
    template::render,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    action::{truthy, ActionNode, PresenceState},
    backend::{BackendError, MessagingBackend},
    error::Result,
    queue::SessionQueues,
};

/// Interpreter tuning knobs.
#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    /// Pause between top-level send actions, unless the subscriber's reply
    /// overrides it. Also the fallback duration for `delay`/`typing` nodes
    /// that carry none.
    pub default_action_delay: Duration,
    /// Wall-clock budget for one response's whole action list. Guards
    /// against a subscriber stacking enough delays to accumulate unbounded
    /// work; `None` disables the guard.
    pub action_budget: Option<Duration>,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            default_action_delay: Duration::from_millis(1200),
            action_budget: Some(Duration::from_secs(300)),
        }
    }
}

/// Executes subscriber action trees against the messaging backend.
#[derive(Debug)]
pub struct Interpreter {
    backend: Arc<dyn MessagingBackend>,
    queues: SessionQueues,
    options: InterpreterOptions,
    clock: SharedClock,
}

impl Interpreter {
    /// Creates an interpreter over the given backend.
    pub fn new(
        backend: Arc<dyn MessagingBackend>,
        options: InterpreterOptions,
        clock: SharedClock,
    ) -> Self {
        Self { backend, queues: SessionQueues::new(), options, clock }
    }

    /// Executes parsed top-level actions sequentially.
    ///
    /// Each failure is logged and the remaining actions continue. After a
    /// non-control action, sleeps `inter_delay` (the original pacing rule:
    /// control nodes manage their own timing, sends get spaced out).
    pub async fn execute_all(
        &self,
        session: &SessionId,
        actions: Vec<ActionNode>,
        inter_delay: Duration,
    ) {
        for node in &actions {
            if let Err(error) = self.execute(session, node).await {
                warn!(%session, %error, "action failed, continuing with remaining actions");
            }
            if !node.is_control() && !inter_delay.is_zero() {
                self.clock.sleep(inter_delay).await;
            }
        }
    }

    /// Executes one node, recursing through control structure.
    fn execute<'a>(
        &'a self,
        session: &'a SessionId,
        node: &'a ActionNode,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match node {
                ActionNode::Noop => Ok(()),

                ActionNode::Delay { ms, state, to } => {
                    let pause = Duration::from_millis(
                        ms.unwrap_or(self.options.default_action_delay.as_millis() as u64),
                    );
                    let indicator = state.filter(|s| s.is_indicator());
                    match (indicator, to) {
                        (Some(state), Some(to)) => {
                            self.indicator_pause(session, to, state, pause).await;
                        },
                        (Some(_), None) => {
                            warn!("delay with presence state requires a destination");
                            self.pause(pause).await;
                        },
                        _ => self.pause(pause).await,
                    }
                    Ok(())
                },

                ActionNode::Typing { to, ms } => {
                    let pause = Duration::from_millis(
                        ms.unwrap_or(self.options.default_action_delay.as_millis() as u64),
                    );
                    self.indicator_pause(session, to, PresenceState::Composing, pause).await;
                    Ok(())
                },

                ActionNode::Presence { to, state } => {
                    if let Some(to) = to {
                        let to = to.clone();
                        self.quiet(session, "presence subscribe", move |b, sid| async move {
                            b.presence_subscribe(&sid, &to).await
                        })
                        .await;
                    }
                    let state = *state;
                    let to = to.clone();
                    self.quiet(session, "presence update", move |b, sid| async move {
                        b.presence_update(&sid, state, to.as_deref()).await
                    })
                    .await;
                    Ok(())
                },

                ActionNode::React { to, key, emoji } => {
                    let (to, key, emoji) = (to.clone(), key.clone(), emoji.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.react(&sid, &to, key, emoji).await
                    })
                    .await
                },

                ActionNode::Star { to, key, on } => {
                    let (to, key, on) = (to.clone(), key.clone(), *on);
                    self.via_queue(session, move |b, sid| async move {
                        b.star(&sid, &to, key, on).await
                    })
                    .await
                },

                ActionNode::DeleteForMe { to, key, delete_media } => {
                    let (to, key, delete_media) = (to.clone(), key.clone(), *delete_media);
                    self.via_queue(session, move |b, sid| async move {
                        b.delete_for_me(&sid, &to, key, delete_media).await
                    })
                    .await
                },

                ActionNode::Revoke { to, key, also_for_me } => {
                    let (to_owned, key_owned) = (to.clone(), key.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.revoke(&sid, &to_owned, key_owned).await
                    })
                    .await?;
                    if *also_for_me {
                        let (to, key) = (to.clone(), key.clone());
                        self.via_queue(session, move |b, sid| async move {
                            b.delete_for_me(&sid, &to, key, true).await
                        })
                        .await?;
                    }
                    Ok(())
                },

                ActionNode::Edit { to, key, text } => {
                    let (to, key, text) = (to.clone(), key.clone(), text.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.edit(&sid, &to, key, text).await
                    })
                    .await
                },

                ActionNode::Read { keys } => {
                    let keys = keys.clone();
                    self.quiet(session, "mark read", move |b, sid| async move {
                        b.mark_read(&sid, keys).await
                    })
                    .await;
                    Ok(())
                },

                ActionNode::Queue { items, inter_delay_ms } => {
                    let step = inter_delay_ms.map(Duration::from_millis).unwrap_or(Duration::ZERO);
                    for (index, item) in items.iter().enumerate() {
                        self.execute(session, item).await?;
                        if !step.is_zero() && index + 1 < items.len() {
                            self.clock.sleep(step).await;
                        }
                    }
                    Ok(())
                },

                ActionNode::Parallel { items } => {
                    join_all(items.iter().map(|item| async move {
                        if let Err(error) = self.execute(session, item).await {
                            warn!(%session, %error, "parallel branch failed");
                        }
                    }))
                    .await;
                    Ok(())
                },

                ActionNode::When { condition, then_branch, else_branch } => {
                    let branch = if truthy(condition) { then_branch } else { else_branch };
                    for item in branch {
                        self.execute(session, item).await?;
                    }
                    Ok(())
                },

                ActionNode::Retry { attempts, backoff_ms, item, on_fail } => {
                    let backoff = Duration::from_millis(*backoff_ms);
                    let mut attempt = 0;
                    while attempt < *attempts {
                        attempt += 1;
                        match self.execute(session, item).await {
                            Ok(()) => return Ok(()),
                            Err(error) => {
                                debug!(attempt, %error, "retry item failed");
                                if attempt < *attempts && !backoff.is_zero() {
                                    self.clock.sleep(backoff).await;
                                }
                            },
                        }
                    }
                    debug!(attempts = *attempts, "retry exhausted, running fallback actions");
                    for item in on_fail {
                        self.execute(session, item).await?;
                    }
                    Ok(())
                },

                ActionNode::Text { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_text(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::Media { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_media(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::Document { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_document(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::Location { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_location(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::Sticker { to, source } => {
                    let (to, source) = (to.clone(), source.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_sticker(&sid, &to, source).await
                    })
                    .await
                },

                ActionNode::Vcard { to, contact } => {
                    let (to, contact) = (to.clone(), contact.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_contact(&sid, &to, contact).await
                    })
                    .await
                },

                ActionNode::Buttons { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_buttons(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::List { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_list(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::Poll { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_poll(&sid, &to, message).await
                    })
                    .await
                },

                ActionNode::Forward { to, message } | ActionNode::Raw { to, message } => {
                    let (to, message) = (to.clone(), message.clone());
                    self.via_queue(session, move |b, sid| async move {
                        b.send_raw(&sid, &to, message).await
                    })
                    .await
                },
            }
        })
    }

    /// Shows an activity indicator around a pause, tolerating every
    /// presence error: indicators are cosmetic and must never fail a tree.
    async fn indicator_pause(
        &self,
        session: &SessionId,
        to: &str,
        state: PresenceState,
        pause: Duration,
    ) {
        let target = to.to_string();

        let to = target.clone();
        self.quiet(session, "presence subscribe", move |b, sid| async move {
            b.presence_subscribe(&sid, &to).await
        })
        .await;

        self.quiet(session, "presence available", move |b, sid| async move {
            b.presence_update(&sid, PresenceState::Available, None).await
        })
        .await;

        let to = target.clone();
        self.quiet(session, "presence indicator", move |b, sid| async move {
            b.presence_update(&sid, state, Some(&to)).await
        })
        .await;

        self.pause(pause).await;

        let to = target;
        self.quiet(session, "presence paused", move |b, sid| async move {
            b.presence_update(&sid, PresenceState::Paused, Some(&to)).await
        })
        .await;
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.clock.sleep(duration).await;
        }
    }

    /// Routes one backend call through the session's send queue.
    async fn via_queue<T, F, Fut>(&self, session: &SessionId, call: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn MessagingBackend>, SessionId) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, BackendError>> + Send + 'static,
        T: Send + 'static,
    {
        let queue = self.queues.queue_for(session).await;
        let work = call(Arc::clone(&self.backend), session.clone());
        Ok(queue.run(work).await??)
    }

    /// Like `via_queue`, but failures are logged and swallowed.
    async fn quiet<F, Fut>(&self, session: &SessionId, what: &'static str, call: F)
    where
        F: FnOnce(Arc<dyn MessagingBackend>, SessionId) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(), BackendError>> + Send + 'static,
    {
        if let Err(error) = self.via_queue(session, call).await {
            debug!(what, %error, "tolerated backend error");
        }
    }
}

#[async_trait::async_trait]
impl ActionSink for Interpreter {
    async fn run_actions(
        &self,
        envelope: &EventEnvelope,
        actions: Vec<Value>,
        delay_override: Option<u64>,
    ) {
        let ctx = envelope.render_context();
        let nodes: Vec<ActionNode> =
            actions.iter().map(|raw| ActionNode::parse(&render(raw, &ctx))).collect();
        let inter_delay = delay_override
            .map(Duration::from_millis)
            .unwrap_or(self.options.default_action_delay);

        let session = &envelope.session.id;
        debug!(%session, actions = nodes.len(), "executing subscriber actions");

        let run = self.execute_all(session, nodes, inter_delay);
        match self.options.action_budget {
            Some(budget) => {
                if tokio::time::timeout(budget, run).await.is_err() {
                    warn!(
                        %session,
                        budget_ms = budget.as_millis() as u64,
                        "action execution budget exceeded, dropping remaining actions"
                    );
                }
            },
            None => run.await,
        }
    }
}
