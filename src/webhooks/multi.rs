//! Composite webhooks.
//!
//! Combine independently written handlers for one object type into a single
//! handler. Validation is fail-fast in list order. Mutation repeats passes
//! over the list until a pass leaves at most one visible change relative to
//! the object at the start of that pass.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::webhook::{
    AdmissionContext, HandlerError, MutatingWebhook, Object, ValidatingWebhook, Webhook,
};

/// Mutation passes allowed per combined webhook before giving up
pub const MAX_PASSES_PER_WEBHOOK: usize = 100;

/// Ordered list of validating webhooks that must all agree
pub struct MultiValidatingWebhook<K> {
    webhooks: Vec<Arc<dyn ValidatingWebhook<K>>>,
}

impl<K: Object> Default for MultiValidatingWebhook<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Object> MultiValidatingWebhook<K> {
    pub fn new() -> Self {
        Self {
            webhooks: Vec::new(),
        }
    }

    /// Append a webhook; it runs after all previously added ones
    pub fn with<W: ValidatingWebhook<K> + 'static>(mut self, webhook: W) -> Self {
        self.push(Arc::new(webhook));
        self
    }

    pub fn push(&mut self, webhook: Arc<dyn ValidatingWebhook<K>>) {
        self.webhooks.push(webhook);
    }

    pub fn len(&self) -> usize {
        self.webhooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }
}

#[async_trait]
impl<K: Object> ValidatingWebhook<K> for MultiValidatingWebhook<K> {
    async fn validate_create(&self, ctx: &AdmissionContext, obj: &K) -> Result<(), HandlerError> {
        for webhook in &self.webhooks {
            webhook.validate_create(ctx, obj).await?;
        }
        Ok(())
    }

    async fn validate_update(
        &self,
        ctx: &AdmissionContext,
        old_obj: &K,
        new_obj: &K,
    ) -> Result<(), HandlerError> {
        for webhook in &self.webhooks {
            webhook.validate_update(ctx, old_obj, new_obj).await?;
        }
        Ok(())
    }

    async fn validate_delete(&self, ctx: &AdmissionContext, obj: &K) -> Result<(), HandlerError> {
        for webhook in &self.webhooks {
            webhook.validate_delete(ctx, obj).await?;
        }
        Ok(())
    }
}

/// Ordered list of mutating webhooks applied until the object stabilizes
pub struct MultiMutatingWebhook<K> {
    webhooks: Vec<Arc<dyn MutatingWebhook<K>>>,
}

impl<K: Object> Default for MultiMutatingWebhook<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Object> MultiMutatingWebhook<K> {
    pub fn new() -> Self {
        Self {
            webhooks: Vec::new(),
        }
    }

    /// Append a webhook; it runs after all previously added ones
    pub fn with<W: MutatingWebhook<K> + 'static>(mut self, webhook: W) -> Self {
        self.push(Arc::new(webhook));
        self
    }

    pub fn push(&mut self, webhook: Arc<dyn MutatingWebhook<K>>) {
        self.webhooks.push(webhook);
    }

    pub fn len(&self) -> usize {
        self.webhooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }

    /// Upper bound on passes for this composite
    pub fn max_passes(&self) -> usize {
        MAX_PASSES_PER_WEBHOOK * self.webhooks.len()
    }

    /// Run passes until one completes with at most one visible change.
    ///
    /// Changes are counted against the snapshot taken at the start of the
    /// pass, not against the state left by the previous webhook, so once any
    /// webhook changes the object every later one in that pass counts too.
    async fn converge(
        &self,
        ctx: &AdmissionContext,
        old_obj: Option<&K>,
        obj: &mut K,
    ) -> Result<(), HandlerError> {
        if self.webhooks.is_empty() {
            return Ok(());
        }

        let max_passes = self.max_passes();
        for pass in 1..=max_passes {
            let snapshot = obj.clone();
            let mut changes = 0usize;

            for webhook in &self.webhooks {
                match old_obj {
                    Some(old_obj) => webhook.mutate_update(ctx, old_obj, obj).await?,
                    None => webhook.mutate_create(ctx, obj).await?,
                }
                if *obj != snapshot {
                    changes += 1;
                }
                if changes > 1 {
                    break;
                }
            }

            if changes <= 1 {
                debug!(uid = %ctx.uid, pass, "Composite mutation converged");
                return Ok(());
            }
        }

        warn!(uid = %ctx.uid, passes = max_passes, "Composite mutation did not converge");
        Err(HandlerError::Convergence { passes: max_passes })
    }
}

#[async_trait]
impl<K: Object> MutatingWebhook<K> for MultiMutatingWebhook<K> {
    async fn mutate_create(&self, ctx: &AdmissionContext, obj: &mut K) -> Result<(), HandlerError> {
        self.converge(ctx, None, obj).await
    }

    async fn mutate_update(
        &self,
        ctx: &AdmissionContext,
        old_obj: &K,
        new_obj: &mut K,
    ) -> Result<(), HandlerError> {
        self.converge(ctx, Some(old_obj), new_obj).await
    }
}

/// Composite of joint webhooks, validating and mutating over the same list
pub struct MultiWebhook<K> {
    validating: MultiValidatingWebhook<K>,
    mutating: MultiMutatingWebhook<K>,
}

impl<K: Object> Default for MultiWebhook<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Object> MultiWebhook<K> {
    pub fn new() -> Self {
        Self {
            validating: MultiValidatingWebhook::new(),
            mutating: MultiMutatingWebhook::new(),
        }
    }

    /// Append a joint webhook to both lists
    pub fn with<W: Webhook<K> + 'static>(mut self, webhook: W) -> Self {
        let webhook = Arc::new(webhook);
        self.validating.push(webhook.clone());
        self.mutating.push(webhook);
        self
    }

    pub fn len(&self) -> usize {
        self.validating.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validating.is_empty()
    }
}

#[async_trait]
impl<K: Object> ValidatingWebhook<K> for MultiWebhook<K> {
    async fn validate_create(&self, ctx: &AdmissionContext, obj: &K) -> Result<(), HandlerError> {
        self.validating.validate_create(ctx, obj).await
    }

    async fn validate_update(
        &self,
        ctx: &AdmissionContext,
        old_obj: &K,
        new_obj: &K,
    ) -> Result<(), HandlerError> {
        self.validating.validate_update(ctx, old_obj, new_obj).await
    }

    async fn validate_delete(&self, ctx: &AdmissionContext, obj: &K) -> Result<(), HandlerError> {
        self.validating.validate_delete(ctx, obj).await
    }
}

#[async_trait]
impl<K: Object> MutatingWebhook<K> for MultiWebhook<K> {
    async fn mutate_create(&self, ctx: &AdmissionContext, obj: &mut K) -> Result<(), HandlerError> {
        self.mutating.mutate_create(ctx, obj).await
    }

    async fn mutate_update(
        &self,
        ctx: &AdmissionContext,
        old_obj: &K,
        new_obj: &mut K,
    ) -> Result<(), HandlerError> {
        self.mutating.mutate_update(ctx, old_obj, new_obj).await
    }
}
