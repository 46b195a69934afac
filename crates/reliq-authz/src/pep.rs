//! Policy enforcement point.
//!
//! The top-level façade every server operation calls. `enforce` builds the
//! subject/action/resource attribute sets, registers the caller's context
//! under a fresh token, invokes the decision evaluator, and reduces the
//! per-rule results deny-biased. Returning `Ok(())` means "permitted";
//! every other outcome is an [`AuthzError`].
//!
//! The decision configuration (attribute finders + policy finder) is held
//! behind an atomic pointer: `enforce` takes a momentary snapshot, then
//! proceeds lock-free; `reload_policies` rebuilds the configuration under a
//! reload mutex and publishes it atomically, so in-flight evaluations never
//! observe a half-updated configuration and new calls only wait for the
//! pointer swap, not the whole reload.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use reliq_core::now_utc;
use reliq_storage::ObjectStore;

use crate::AuthzResult;
use crate::attr::{Attribute, RequestAttributes, ids};
use crate::config::{
    AuthzConfig, ENFORCE_MODE_DENY_ALL, ENFORCE_MODE_ENFORCE_POLICIES, ENFORCE_MODE_PERMIT_ALL,
};
use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::eval::{
    DecisionEvaluator, EvaluationContext, PolicyFinder, PolicyTreeEvaluator, permitted,
    summarize_denial,
};
use crate::finder::{AttributeFinder, ContextFinder, EnvironmentFinder, ResourceFinder};
use crate::policy::{
    BackendPolicyGenerator, BackendSecuritySpec, PolicyParser, RepositoryPolicyFinder,
};
use crate::registry::ContextRegistry;

/// One published decision configuration: the finder chain and the policy
/// finder an evaluation runs against.
pub struct Pdp {
    finders: Vec<Arc<dyn AttributeFinder>>,
    policy_finder: Arc<dyn PolicyFinder>,
}

impl Pdp {
    /// Bundle a configuration.
    #[must_use]
    pub fn new(finders: Vec<Arc<dyn AttributeFinder>>, policy_finder: Arc<dyn PolicyFinder>) -> Self {
        Self {
            finders,
            policy_finder,
        }
    }
}

/// The policy enforcement point.
pub struct EnforcementPoint {
    config: AuthzConfig,
    store: Arc<dyn ObjectStore>,
    evaluator: Arc<dyn DecisionEvaluator>,
    registry: Arc<ContextRegistry>,
    pdp: ArcSwap<Pdp>,
    reload_lock: Mutex<()>,
}

impl EnforcementPoint {
    /// Build an enforcement point with an injected decision evaluator.
    ///
    /// Loads the policy repository (seeding and backend generation
    /// included) before returning.
    ///
    /// # Errors
    ///
    /// Fails when the backend security specification or the policy
    /// repository cannot be loaded.
    pub async fn new(
        config: AuthzConfig,
        store: Arc<dyn ObjectStore>,
        evaluator: Arc<dyn DecisionEvaluator>,
    ) -> AuthzResult<Self> {
        let pdp = build_pdp(&config, &store).await?;
        Ok(Self {
            config,
            store,
            evaluator,
            registry: Arc::new(ContextRegistry::new()),
            pdp: ArcSwap::from_pointee(pdp),
            reload_lock: Mutex::new(()),
        })
    }

    /// Build an enforcement point with the bundled evaluator.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub async fn with_default_evaluator(
        config: AuthzConfig,
        store: Arc<dyn ObjectStore>,
    ) -> AuthzResult<Self> {
        Self::new(config, store, Arc::new(PolicyTreeEvaluator::new())).await
    }

    /// The context registry (exposed for embedding and tests).
    #[must_use]
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Authorize one operation.
    ///
    /// Returning `Ok(())` means "permitted". `subject_id` of `None` is an
    /// anonymous subject, which is valid; empty `pid`/`namespace` mean "no
    /// target object".
    ///
    /// # Errors
    ///
    /// - [`AuthzError::Denied`] - evaluation produced a non-permit outcome
    /// - [`AuthzError::PermittedButNoOp`] - permitted, but the context
    ///   carries the dry-run flag
    /// - [`AuthzError::Operational`] - invalid enforce mode, or the
    ///   evaluator failed
    pub async fn enforce(
        &self,
        subject_id: Option<&str>,
        action_id: &str,
        api: &str,
        pid: &str,
        namespace: &str,
        context: RequestContext,
    ) -> AuthzResult<()> {
        match self.config.enforce_mode.as_str() {
            ENFORCE_MODE_ENFORCE_POLICIES => {}
            ENFORCE_MODE_PERMIT_ALL => {
                tracing::debug!(action = action_id, "enforce mode permits all requests");
                return Ok(());
            }
            ENFORCE_MODE_DENY_ALL => {
                tracing::debug!(action = action_id, "enforce mode denies all requests");
                return Err(AuthzError::denied("all requests are denied by configuration"));
            }
            other => {
                return Err(AuthzError::operational(format!(
                    "invalid enforce mode '{other}'"
                )));
            }
        }

        let no_op = context.no_op();

        // The guard unregisters the context when this function returns,
        // whatever the outcome.
        let guard = self.registry.register_guarded(Arc::new(context));
        let attributes =
            build_request_attributes(subject_id, action_id, api, pid, namespace, guard.token());

        let pdp = self.pdp.load_full();
        let ctx = EvaluationContext::new(
            attributes,
            pdp.finders.clone(),
            self.registry.clone(),
            pdp.policy_finder.clone(),
            now_utc(),
        );

        let results = self.evaluator.evaluate(&ctx).await.map_err(|e| {
            AuthzError::operational(format!("policy evaluation failed: {e}"))
        })?;
        drop(guard);

        if permitted(&results) {
            if no_op {
                tracing::debug!(action = action_id, "permitted dry-run request");
                return Err(AuthzError::PermittedButNoOp);
            }
            tracing::debug!(action = action_id, subject = ?subject_id, "request permitted");
            Ok(())
        } else {
            let reason = summarize_denial(&results);
            tracing::debug!(action = action_id, subject = ?subject_id, reason = %reason, "request denied");
            Err(AuthzError::denied(reason))
        }
    }

    /// Re-parse the backend security specification, regenerate backend
    /// policies, reload the repository cache, and publish the new decision
    /// configuration atomically.
    ///
    /// Reloads are serialized; concurrent `enforce` calls keep evaluating
    /// against the previous configuration until the swap.
    ///
    /// # Errors
    ///
    /// Fails when the new configuration cannot be built; the previous
    /// configuration stays published.
    pub async fn reload_policies(&self) -> AuthzResult<()> {
        self.new_pdp().await
    }

    /// Rebuild and atomically publish the decision configuration.
    ///
    /// # Errors
    ///
    /// See [`reload_policies`](Self::reload_policies).
    pub async fn new_pdp(&self) -> AuthzResult<()> {
        let _reloading = self.reload_lock.lock().await;
        let pdp = build_pdp(&self.config, &self.store).await?;
        self.pdp.store(Arc::new(pdp));
        tracing::info!("decision configuration republished");
        Ok(())
    }
}

/// Build a decision configuration: fresh finder instances and a freshly
/// initialized repository policy finder.
async fn build_pdp(config: &AuthzConfig, store: &Arc<dyn ObjectStore>) -> AuthzResult<Pdp> {
    let generator = match &config.backend_spec_path {
        Some(path) => Some(BackendPolicyGenerator::new(
            BackendSecuritySpec::load(path).await?,
        )),
        None => None,
    };

    let policy_finder = Arc::new(RepositoryPolicyFinder::new(
        store.clone(),
        PolicyParser::new(),
        config.policy.clone(),
        generator,
    ));
    policy_finder.init().await?;

    let finders: Vec<Arc<dyn AttributeFinder>> = vec![
        Arc::new(EnvironmentFinder::new()),
        Arc::new(ContextFinder::new()),
        Arc::new(ResourceFinder::new(
            store.clone(),
            config.owner_id_separator.clone(),
        )),
    ];

    Ok(Pdp::new(finders, policy_finder))
}

/// Wrap the enforce arguments into per-category attribute tables.
fn build_request_attributes(
    subject_id: Option<&str>,
    action_id: &str,
    api: &str,
    pid: &str,
    namespace: &str,
    token: &str,
) -> RequestAttributes {
    let mut attributes = RequestAttributes::default();

    if let Some(login) = subject_id.filter(|s| !s.is_empty()) {
        attributes
            .subject
            .insert(Attribute::single(ids::subject::LOGIN_ID, login.into()));
    }

    attributes
        .action
        .insert(Attribute::single(ids::action::ID, action_id.into()));
    attributes
        .action
        .insert(Attribute::single(ids::action::API, api.into()));
    attributes
        .action
        .insert(Attribute::single(ids::action::CONTEXT_TOKEN, token.into()));

    if !pid.is_empty() {
        attributes
            .resource
            .insert(Attribute::single(ids::resource::PID, pid.into()));
    }
    if !namespace.is_empty() {
        attributes
            .resource
            .insert(Attribute::single(ids::resource::NAMESPACE, namespace.into()));
    }

    attributes
}
