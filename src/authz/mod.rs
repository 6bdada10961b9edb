pub mod rule;
pub mod scope;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};

use crate::authn::Subject;
use crate::guard::{Denial, Guard, GuardContext, GuardKind, GuardResult, RequestParts};
use crate::permission::{Action, Permission};

/// Decides whether a subject may perform an action on a permission.
///
/// An `Err` means the evaluator could not decide (backend unreachable,
/// broken policy store, ...). It must not be used to say "no".
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn is_permitted(
        &self,
        subject: &Subject,
        permission: &Permission,
        action: Action,
    ) -> Result<bool>;
}

/// Target of one authorization check: the resource instance (absent for
/// collection-level checks) and the subject that owns it, if known.
///
/// An owner binding asserts that the resource is owned by the subject with
/// that id, which lets self-service requests skip the policy evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthzContext {
    resource_id: Option<String>,
    owner: Option<String>,
}

impl AuthzContext {
    pub fn collection() -> Self {
        Self::default()
    }

    pub fn instance(id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(id.into()),
            owner: None,
        }
    }

    pub fn owned_by(self, owner: impl Into<String>) -> Self {
        Self {
            resource_id: self.resource_id,
            owner: Some(owner.into()),
        }
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_owned_by(&self, subject: &Subject) -> bool {
        matches!(self.owner.as_deref(), Some(owner) if owner == subject.id)
    }
}

/// Makes allow/deny decisions on top of a [`PolicyEvaluator`].
///
/// Decision order:
/// 1. The subject owns the target (`ctx.owner == subject.id`): allow without
///    asking the evaluator.
/// 2. Otherwise ask the evaluator: `true` allows, `false` is a 403.
/// 3. An evaluator error or timeout is a 500, the cause is logged only.
pub struct Authorizer {
    evaluator: Arc<dyn PolicyEvaluator>,
    timeout: Option<Duration>,
}

impl Authorizer {
    pub fn new(evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            evaluator,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn decide(
        &self,
        subject: &Subject,
        permission: &Permission,
        action: Action,
        ctx: &AuthzContext,
    ) -> GuardResult {
        if ctx.is_owned_by(subject) {
            debug!(
                "Subject '{}' owns '{permission}', allow '{action}'",
                subject.id
            );
            return GuardResult::Allow;
        }

        let check = self.evaluator.is_permitted(subject, permission, action);
        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, check).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "policy evaluation timed out after {}ms",
                    timeout.as_millis()
                )),
            },
            None => check.await,
        };

        match result {
            Ok(true) => GuardResult::Allow,
            Ok(false) => {
                debug!(
                    "Policy denied '{action}' on '{permission}' for '{}'",
                    subject.id
                );
                GuardResult::Deny(Denial::forbidden())
            }
            Err(e) => {
                error!(
                    "Evaluate policy for '{}' '{action}' on '{permission}': {e:#}",
                    subject.id
                );
                GuardResult::Deny(Denial::backend_error())
            }
        }
    }

    /// Builds a guard checking one permission, action and context.
    pub fn authorize(
        self: &Arc<Self>,
        permission: Permission,
        action: Action,
        ctx: AuthzContext,
    ) -> AuthzGuard {
        AuthzGuard {
            authorizer: self.clone(),
            permission,
            action,
            ctx,
        }
    }
}

/// Guard produced by [`Authorizer::authorize`] for a fixed target.
pub struct AuthzGuard {
    authorizer: Arc<Authorizer>,
    permission: Permission,
    action: Action,
    ctx: AuthzContext,
}

impl AuthzGuard {
    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    pub fn context(&self) -> &AuthzContext {
        &self.ctx
    }
}

#[async_trait]
impl Guard for AuthzGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Authorization
    }

    fn name(&self) -> &str {
        self.action.as_str()
    }

    async fn evaluate(&self, _req: &RequestParts, ctx: &mut GuardContext) -> GuardResult {
        let subject = match ctx.subject() {
            Some(subject) => subject,
            None => return GuardResult::Deny(Denial::unauthenticated("no authenticated subject")),
        };
        self.authorizer
            .decide(subject, &self.permission, self.action, &self.ctx)
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Evaluator answering from a fixed result and recording every call.
    pub struct RecordingEvaluator {
        answer: Result<bool, String>,
        delay: Option<Duration>,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<(String, String, Action)>>,
    }

    impl RecordingEvaluator {
        pub fn answer(allow: bool) -> Arc<Self> {
            Arc::new(Self::new(Ok(allow), None))
        }

        pub fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self::new(Err(message.to_string()), None))
        }

        pub fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self::new(Ok(true), Some(delay)))
        }

        fn new(answer: Result<bool, String>, delay: Option<Duration>) -> Self {
            Self {
                answer,
                delay,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(vec![]),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PolicyEvaluator for RecordingEvaluator {
        async fn is_permitted(
            &self,
            subject: &Subject,
            permission: &Permission,
            action: Action,
        ) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                subject.id.clone(),
                permission.to_string(),
                action,
            ));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.answer {
                Ok(allow) => Ok(*allow),
                Err(message) => anyhow::bail!("{message}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::permission::{PermissionNamer, ACCOUNTS};

    use super::testing::RecordingEvaluator;
    use super::*;

    fn permission(id: &str) -> Permission {
        PermissionNamer::new("hydra").unwrap().instance(ACCOUNTS, id)
    }

    #[tokio::test]
    async fn test_ownership_short_circuit() {
        let evaluator = RecordingEvaluator::answer(false);
        let authorizer = Authorizer::new(evaluator.clone());

        let subject = Subject::new("u1");
        let ctx = AuthzContext::instance("u1").owned_by("u1");
        for action in [Action::Get, Action::Delete] {
            let result = authorizer
                .decide(&subject, &permission("u1"), action, &ctx)
                .await;
            assert_eq!(result, GuardResult::Allow);
        }
        assert_eq!(evaluator.calls(), 0);
    }

    #[tokio::test]
    async fn test_delegates_to_evaluator() {
        let subject = Subject::new("u1");
        let contexts = [
            AuthzContext::collection(),
            AuthzContext::instance("u2"),
            AuthzContext::instance("u2").owned_by("u2"),
        ];

        for allow in [true, false] {
            let evaluator = RecordingEvaluator::answer(allow);
            let authorizer = Authorizer::new(evaluator.clone());
            for ctx in contexts.iter() {
                let result = authorizer
                    .decide(&subject, &permission("u2"), Action::Delete, ctx)
                    .await;
                if allow {
                    assert_eq!(result, GuardResult::Allow);
                } else {
                    assert_eq!(result, GuardResult::Deny(Denial::forbidden()));
                }
            }
            assert_eq!(evaluator.calls(), contexts.len());
            let seen = evaluator.seen.lock().unwrap();
            assert_eq!(
                seen[0],
                (
                    String::from("u1"),
                    String::from("rn:hydra:accounts:u2"),
                    Action::Delete
                )
            );
        }
    }

    #[tokio::test]
    async fn test_denied_is_stable() {
        let evaluator = RecordingEvaluator::answer(false);
        let authorizer = Authorizer::new(evaluator.clone());
        let subject = Subject::new("u1");
        let ctx = AuthzContext::instance("u2").owned_by("u2");

        for _ in 0..5 {
            let result = authorizer
                .decide(&subject, &permission("u2"), Action::Get, &ctx)
                .await;
            match result {
                GuardResult::Deny(denial) => assert_eq!(denial.status, 403),
                GuardResult::Allow => panic!("expected forbidden"),
            }
        }
    }

    #[tokio::test]
    async fn test_backend_error() {
        let evaluator = RecordingEvaluator::failing("connection refused by policy store");
        let authorizer = Authorizer::new(evaluator.clone());

        let result = authorizer
            .decide(
                &Subject::new("u1"),
                &permission("u2"),
                Action::Get,
                &AuthzContext::instance("u2").owned_by("u2"),
            )
            .await;
        match result {
            GuardResult::Deny(denial) => {
                assert_eq!(denial, Denial::backend_error());
                assert!(!denial.message.contains("connection refused"));
            }
            GuardResult::Allow => panic!("expected backend error"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let evaluator = RecordingEvaluator::slow(Duration::from_secs(5));
        let authorizer = Authorizer::new(evaluator.clone()).with_timeout(Duration::from_millis(20));

        let result = authorizer
            .decide(
                &Subject::new("u1"),
                &permission("u2"),
                Action::Get,
                &AuthzContext::instance("u2"),
            )
            .await;
        assert_eq!(result, GuardResult::Deny(Denial::backend_error()));
        assert_eq!(evaluator.calls(), 1);
    }

    #[tokio::test]
    async fn test_guard() {
        let evaluator = RecordingEvaluator::answer(true);
        let authorizer = Arc::new(Authorizer::new(evaluator.clone()));
        let guard = authorizer.authorize(
            permission("u1"),
            Action::Get,
            AuthzContext::instance("u1").owned_by("u1"),
        );
        assert_eq!(guard.kind(), GuardKind::Authorization);
        assert_eq!(guard.name(), "get");
        assert_eq!(guard.permission().as_str(), "rn:hydra:accounts:u1");
        assert_eq!(guard.context().owner(), Some("u1"));

        let req = RequestParts::default();
        let mut ctx = GuardContext::new();
        let result = guard.evaluate(&req, &mut ctx).await;
        assert_eq!(
            result,
            GuardResult::Deny(Denial::unauthenticated("no authenticated subject"))
        );

        ctx.set_subject(Subject::new("u1"));
        assert!(guard.evaluate(&req, &mut ctx).await.is_allow());
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn test_context() {
        let ctx = AuthzContext::collection();
        assert_eq!(ctx.resource_id(), None);
        assert!(!ctx.is_owned_by(&Subject::new("u1")));

        let ctx = AuthzContext::instance("u1").owned_by("u1");
        assert_eq!(ctx.resource_id(), Some("u1"));
        assert!(ctx.is_owned_by(&Subject::new("u1")));
        assert!(!ctx.is_owned_by(&Subject::new("u2")));
    }
}
