use std::sync::Arc;

use async_trait::async_trait;

use crate::guard::{Denial, Guard, GuardContext, GuardKind, GuardResult, RequestParts};
use crate::permission::{Action, PermissionNamer};

use super::{AuthzContext, AuthzGuard, Authorizer};

/// Which resource a route-level authorization check targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzScope {
    /// The whole collection, e.g. `rn:hydra:accounts`.
    Collection,

    /// One instance whose id is taken from a route parameter. An account is
    /// owned by itself, so the id is also bound as the owner.
    Instance { param: &'static str },
}

/// Authorization guard whose target depends on the request: the permission
/// and owner are derived from the route parameters at evaluation time.
pub struct ScopedAuthorization {
    authorizer: Arc<Authorizer>,
    namer: Arc<PermissionNamer>,
    resource_type: &'static str,
    action: Action,
    scope: AuthzScope,
}

impl ScopedAuthorization {
    pub fn new(
        authorizer: Arc<Authorizer>,
        namer: Arc<PermissionNamer>,
        resource_type: &'static str,
        action: Action,
        scope: AuthzScope,
    ) -> Self {
        Self {
            authorizer,
            namer,
            resource_type,
            action,
            scope,
        }
    }

    pub fn collection(
        authorizer: Arc<Authorizer>,
        namer: Arc<PermissionNamer>,
        resource_type: &'static str,
        action: Action,
    ) -> Self {
        Self::new(authorizer, namer, resource_type, action, AuthzScope::Collection)
    }

    pub fn instance(
        authorizer: Arc<Authorizer>,
        namer: Arc<PermissionNamer>,
        resource_type: &'static str,
        action: Action,
        param: &'static str,
    ) -> Self {
        Self::new(
            authorizer,
            namer,
            resource_type,
            action,
            AuthzScope::Instance { param },
        )
    }

    pub fn scope(&self) -> AuthzScope {
        self.scope
    }
}

#[async_trait]
impl Guard for ScopedAuthorization {
    fn kind(&self) -> GuardKind {
        GuardKind::Authorization
    }

    fn name(&self) -> &str {
        self.action.as_str()
    }

    async fn evaluate(&self, req: &RequestParts, ctx: &mut GuardContext) -> GuardResult {
        let guard = match self.target(req) {
            Ok(guard) => guard,
            Err(denial) => return GuardResult::Deny(denial),
        };
        guard.evaluate(req, ctx).await
    }
}

impl ScopedAuthorization {
    /// Resolves the permission and context of one request and builds the
    /// authorization guard for it.
    fn target(&self, req: &RequestParts) -> Result<AuthzGuard, Denial> {
        let (permission, authz_ctx) = match self.scope {
            AuthzScope::Collection => (
                self.namer.collection(self.resource_type),
                AuthzContext::collection(),
            ),
            AuthzScope::Instance { param } => {
                let id = req
                    .param(param)
                    .ok_or_else(|| Denial::bad_request("No id given"))?;
                (
                    self.namer.instance(self.resource_type, id),
                    AuthzContext::instance(id).owned_by(id),
                )
            }
        };
        Ok(self.authorizer.authorize(permission, self.action, authz_ctx))
    }
}

#[cfg(test)]
mod tests {
    use crate::authn::Subject;
    use crate::authz::testing::RecordingEvaluator;
    use crate::permission::ACCOUNTS;

    use super::*;

    fn namer() -> Arc<PermissionNamer> {
        Arc::new(PermissionNamer::new("hydra").unwrap())
    }

    fn authed() -> GuardContext {
        let mut ctx = GuardContext::new();
        ctx.set_subject(Subject::new("u1"));
        ctx
    }

    #[tokio::test]
    async fn test_collection() {
        let evaluator = RecordingEvaluator::answer(true);
        let authorizer = Arc::new(Authorizer::new(evaluator.clone()));
        let guard = ScopedAuthorization::collection(authorizer, namer(), ACCOUNTS, Action::Create);
        assert_eq!(guard.scope(), AuthzScope::Collection);

        let req = RequestParts::new("POST", "/accounts");
        let result = guard.evaluate(&req, &mut authed()).await;
        assert!(result.is_allow());
        assert_eq!(evaluator.calls(), 1);
        assert_eq!(
            evaluator.seen.lock().unwrap()[0],
            (
                String::from("u1"),
                String::from("rn:hydra:accounts"),
                Action::Create
            )
        );
    }

    #[tokio::test]
    async fn test_instance() {
        let evaluator = RecordingEvaluator::answer(false);
        let authorizer = Arc::new(Authorizer::new(evaluator.clone()));
        let guard =
            ScopedAuthorization::instance(authorizer, namer(), ACCOUNTS, Action::Get, "id");

        // Own account, the evaluator is never asked
        let req = RequestParts::new("GET", "/accounts/u1").with_param("id", "u1");
        assert!(guard.evaluate(&req, &mut authed()).await.is_allow());
        assert_eq!(evaluator.calls(), 0);

        let req = RequestParts::new("GET", "/accounts/u2").with_param("id", "u2");
        let result = guard.evaluate(&req, &mut authed()).await;
        assert_eq!(result, GuardResult::Deny(Denial::forbidden()));
        assert_eq!(evaluator.calls(), 1);
        assert_eq!(
            evaluator.seen.lock().unwrap()[0],
            (
                String::from("u1"),
                String::from("rn:hydra:accounts:u2"),
                Action::Get
            )
        );
    }

    #[test]
    fn test_target() {
        let authorizer = Arc::new(Authorizer::new(RecordingEvaluator::answer(true)));
        let guard =
            ScopedAuthorization::instance(authorizer.clone(), namer(), ACCOUNTS, Action::Delete, "id");

        let req = RequestParts::new("DELETE", "/accounts/u2").with_param("id", "u2");
        let target = guard.target(&req).unwrap();
        assert_eq!(target.name(), "delete");
        assert_eq!(target.permission().as_str(), "rn:hydra:accounts:u2");
        assert_eq!(target.context(), &AuthzContext::instance("u2").owned_by("u2"));

        let guard = ScopedAuthorization::collection(authorizer, namer(), ACCOUNTS, Action::Create);
        let target = guard.target(&RequestParts::new("POST", "/accounts")).unwrap();
        assert_eq!(target.permission().as_str(), "rn:hydra:accounts");
        assert_eq!(target.context(), &AuthzContext::collection());
    }

    #[tokio::test]
    async fn test_missing_id() {
        let evaluator = RecordingEvaluator::answer(true);
        let authorizer = Arc::new(Authorizer::new(evaluator.clone()));
        let guard =
            ScopedAuthorization::instance(authorizer, namer(), ACCOUNTS, Action::Delete, "id");

        for req in [
            RequestParts::new("DELETE", "/accounts/"),
            RequestParts::new("DELETE", "/accounts/").with_param("id", ""),
        ] {
            match guard.evaluate(&req, &mut authed()).await {
                GuardResult::Deny(denial) => {
                    assert_eq!(denial.status, 400);
                    assert_eq!(denial.message, "No id given");
                }
                GuardResult::Allow => panic!("expected bad request"),
            }
        }
        assert_eq!(evaluator.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_subject() {
        let evaluator = RecordingEvaluator::answer(true);
        let authorizer = Arc::new(Authorizer::new(evaluator.clone()));
        let guard = ScopedAuthorization::collection(authorizer, namer(), ACCOUNTS, Action::Create);

        let req = RequestParts::new("POST", "/accounts");
        let result = guard.evaluate(&req, &mut GuardContext::new()).await;
        match result {
            GuardResult::Deny(denial) => assert_eq!(denial.status, 401),
            GuardResult::Allow => panic!("expected unauthenticated"),
        }
        assert_eq!(evaluator.calls(), 0);
    }
}
