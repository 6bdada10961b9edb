use std::sync::Arc;

use crate::authn::jwt::JwtTokenGenerator;
use crate::authn::Authenticator;
use crate::authz::Authorizer;
use crate::permission::PermissionNamer;
use crate::storage::Storage;

/// Components shared by every route, assembled once at startup.
pub struct ServerContext {
    pub namer: Arc<PermissionNamer>,

    pub authenticator: Arc<Authenticator>,
    pub authorizer: Arc<Authorizer>,

    pub storage: Arc<dyn Storage>,

    pub token_generator: Arc<JwtTokenGenerator>,
}

#[cfg(test)]
impl ServerContext {
    pub fn new_test(
        evaluator: Arc<dyn crate::authz::PolicyEvaluator>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        use crate::authn::jwt::JwtTokenValidator;

        Self {
            namer: Arc::new(PermissionNamer::new("hydra").unwrap()),
            authenticator: Arc::new(Authenticator::new(Arc::new(JwtTokenValidator::new_test()))),
            authorizer: Arc::new(Authorizer::new(evaluator)),
            storage,
            token_generator: Arc::new(JwtTokenGenerator::new_test()),
        }
    }
}
