use futures_util::future::join_all;
use postino_core::{
    validation::{validate_send_direct, validate_send_group},
    Limits, Message, NewMessage, SendDirectRequest, SendGroupRequest,
};
use std::sync::Arc;

use crate::cache::{CacheError, RecencyCache};
use crate::config::FanoutPolicy;
use crate::directory::Directory;
use crate::error::ServiceError;
use crate::gate::AccessGate;
use crate::store::MessageStore;

/// Send path: gate check, persist, then fan the summary out to the
/// recipients' recency caches.
pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn RecencyCache>,
    directory: Arc<dyn Directory>,
    gate: AccessGate,
    policy: FanoutPolicy,
    limits: Limits,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        cache: Arc<dyn RecencyCache>,
        directory: Arc<dyn Directory>,
        policy: FanoutPolicy,
        limits: Limits,
    ) -> Self {
        Self {
            gate: AccessGate::new(Arc::clone(&directory)),
            store,
            cache,
            directory,
            policy,
            limits,
        }
    }

    pub async fn send_direct(&self, req: &SendDirectRequest) -> Result<Message, ServiceError> {
        validate_send_direct(req, &self.limits)?;
        if !self
            .gate
            .can_send_direct(&req.sender_id, &req.recipient_id)
            .await?
        {
            tracing::info!(
                sender = %req.sender_id,
                recipient = %req.recipient_id,
                "direct message refused, sender is blocked"
            );
            return Err(ServiceError::AccessDenied {
                sender_id: req.sender_id.clone(),
                recipient_id: req.recipient_id.clone(),
            });
        }

        let message = self
            .store
            .persist(NewMessage::direct(&req.sender_id, &req.recipient_id, &req.text))
            .await?;
        self.fan_out(&message, std::slice::from_ref(&req.recipient_id))
            .await?;
        Ok(message)
    }

    pub async fn send_group(&self, req: &SendGroupRequest) -> Result<Message, ServiceError> {
        validate_send_group(req, &self.limits)?;
        let members = self.directory.list_group_members(&req.group_id).await?;

        let message = self
            .store
            .persist(NewMessage::group(&req.sender_id, &req.group_id, &req.text))
            .await?;
        let recipients: Vec<String> = members
            .into_iter()
            .filter(|m| m != &req.sender_id)
            .collect();
        self.fan_out(&message, &recipients).await?;
        Ok(message)
    }

    /// One push per recipient, all attempted. The message is already stored
    /// at this point, so a failure here never undoes it.
    async fn fan_out(&self, message: &Message, recipients: &[String]) -> Result<(), ServiceError> {
        let summary = message.summary();
        let pushes = recipients.iter().map(|recipient| {
            let summary = summary.clone();
            async move { (recipient, self.cache.push(recipient, summary).await) }
        });

        let mut failed = 0;
        let mut first_error: Option<CacheError> = None;
        for (recipient, result) in join_all(pushes).await {
            if let Err(error) = result {
                tracing::warn!(
                    message_id = %message.message_id,
                    %recipient,
                    %error,
                    "recency cache push failed"
                );
                failed += 1;
                first_error.get_or_insert(error);
            }
        }

        tracing::info!(
            message_id = %message.message_id,
            kind = ?message.channel_kind,
            recipients = recipients.len(),
            failed,
            "message dispatched"
        );

        match (first_error, self.policy) {
            (None, _) | (Some(_), FanoutPolicy::BestEffort) => Ok(()),
            (Some(source), FanoutPolicy::Strict) => Err(ServiceError::FanoutDegraded {
                message_id: message.message_id.clone(),
                timestamp: message.timestamp,
                failed,
                source,
            }),
        }
    }
}
