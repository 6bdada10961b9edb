use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs, io};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslFiletype, SslMethod};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::authn::jwt::{JwtTokenGenerator, JwtTokenValidator};
use crate::authn::Authenticator;
use crate::authz::rule::{PolicyRule, RulePolicyEvaluator};
use crate::authz::Authorizer;
use crate::context::ServerContext;
use crate::logs::LogsConfig;
use crate::permission::PermissionNamer;
use crate::restful::RestfulServer;
use crate::rsa;
use crate::storage::config::StorageConfig;

pub struct PathSet {
    pub config_path: PathBuf,
    pub data_path: PathBuf,
    pub pki_path: PathBuf,
}

impl PathSet {
    pub fn new(config_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => match env::var("ACCOUNTD_CONFIG") {
                Ok(path) => PathBuf::from(path),
                Err(_) => Self::home_dir()?.join(".config").join("accountd"),
            },
        };

        let data_path = match data_path {
            Some(path) => path,
            None => match env::var("ACCOUNTD_DATA") {
                Ok(path) => PathBuf::from(path),
                Err(_) => Self::home_dir()?
                    .join(".local")
                    .join("share")
                    .join("accountd"),
            },
        };

        // PKI path is always under config path
        let pki_path = config_path.join("pki");

        ensure_dir_exists(&config_path)
            .with_context(|| format!("ensure config directory: {}", config_path.display()))?;
        ensure_dir_exists(&data_path)
            .with_context(|| format!("ensure data directory: {}", data_path.display()))?;
        ensure_dir_exists(&pki_path)
            .with_context(|| format!("ensure pki directory: {}", pki_path.display()))?;

        Ok(Self {
            config_path,
            data_path,
            pki_path,
        })
    }

    pub fn load_config<T, F>(&self, name: &str, default_func: F) -> Result<T>
    where
        T: CommonConfig + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let path = self.config_path.join(format!("{name}.toml"));
        let mut cfg: T = match fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s).context("parse config toml")?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("Config file for {name} not found, using defaults");
                default_func()
            }
            Err(err) => {
                return Err(err).context(format!("read config file: {}", path.display()));
            }
        };

        cfg.complete(self).context("validate config")?;
        Ok(cfg)
    }

    fn home_dir() -> Result<PathBuf> {
        match env::var_os("HOME").map(PathBuf::from) {
            Some(dir) => Ok(dir),
            None => bail!("could not determine home directory, please specify config path manually"),
        }
    }
}

pub trait CommonConfig {
    fn default() -> Self;
    fn complete(&mut self, ps: &PathSet) -> Result<()>;
}

/// See: [`shellexpand::full`].
pub fn expandenv(name: &str, s: impl AsRef<str>) -> Result<String> {
    let s =
        shellexpand::full(s.as_ref()).with_context(|| format!("expand env value for '{name}'"))?;
    Ok(s.to_string())
}

fn ensure_dir_exists(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => bail!("'{}' is not a directory", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,

    #[serde(default)]
    pub ssl: bool,

    pub keep_alive_secs: Option<u64>,

    pub workers: Option<u64>,

    pub payload_limit_mib: Option<u64>,

    /// Namespace of the permission names, `rn:<namespace>:accounts`
    #[serde(default = "ServerConfig::default_namespace")]
    pub namespace: String,

    #[serde(default = "AuthnConfig::default")]
    pub authn: AuthnConfig,

    #[serde(default = "AuthzConfig::default")]
    pub authz: AuthzConfig,

    #[serde(default = "StorageConfig::default")]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(skip)]
    pki_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthnConfig {
    #[serde(default = "AuthnConfig::default_token_expiration_secs")]
    pub token_expiration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthzConfig {
    /// Upper bound of one policy evaluation. Unset means no bound.
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
}

impl CommonConfig for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            ssl: false,
            keep_alive_secs: None,
            workers: None,
            payload_limit_mib: None,
            namespace: Self::default_namespace(),
            authn: AuthnConfig::default(),
            authz: AuthzConfig::default(),
            storage: StorageConfig::default(),
            logs: LogsConfig::default(),
            pki_dir: PathBuf::new(),
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        self.bind = expandenv("bind", &self.bind)?;
        if self.bind.is_empty() {
            bail!("bind is required");
        }

        if let Some(keep_alive_secs) = self.keep_alive_secs {
            if keep_alive_secs == 0 {
                bail!("keep_alive_secs must be greater than 0");
            }
        }

        if let Some(workers) = self.workers {
            if workers == 0 {
                bail!("workers must be greater than 0");
            }
        }

        if let Some(payload_limit_mib) = self.payload_limit_mib {
            if payload_limit_mib == 0 {
                bail!("payload_limit_mib must be greater than 0");
            }
        }

        PermissionNamer::new(self.namespace.as_str()).context("namespace")?;

        self.authn.complete(ps).context("authn")?;
        self.authz.complete(ps).context("authz")?;
        self.storage.complete(ps).context("storage")?;

        self.pki_dir = ps.pki_path.clone();

        Ok(())
    }
}

impl CommonConfig for AuthnConfig {
    fn default() -> Self {
        Self {
            token_expiration_secs: Self::default_token_expiration_secs(),
        }
    }

    fn complete(&mut self, _ps: &PathSet) -> Result<()> {
        if self.token_expiration_secs < Self::MIN_TOKEN_EXPIRATION_SECS
            || self.token_expiration_secs > Self::MAX_TOKEN_EXPIRATION_SECS
        {
            bail!(
                "token_expiration_secs must be in range [{}, {}]",
                Self::MIN_TOKEN_EXPIRATION_SECS,
                Self::MAX_TOKEN_EXPIRATION_SECS
            );
        }
        Ok(())
    }
}

impl AuthnConfig {
    const MIN_TOKEN_EXPIRATION_SECS: u64 = 60;
    const MAX_TOKEN_EXPIRATION_SECS: u64 = 60 * 60 * 24 * 365;

    fn default_token_expiration_secs() -> u64 {
        60 * 60 // 1 hour
    }
}

impl CommonConfig for AuthzConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            rules: vec![],
        }
    }

    fn complete(&mut self, _ps: &PathSet) -> Result<()> {
        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms == 0 {
                bail!("timeout_ms must be greater than 0");
            }
        }
        for (idx, rule) in self.rules.iter().enumerate() {
            rule.validate().with_context(|| format!("rules[{idx}]"))?;
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn build_ctx(&self) -> Result<Arc<ServerContext>> {
        let storage = self.storage.build().context("init storage")?;

        let (token_public, token_private) = self.read_jwt_keys()?;
        let token_generator =
            JwtTokenGenerator::new(&token_private, self.authn.token_expiration_secs)
                .context("init jwt token generator")?;
        let token_validator =
            JwtTokenValidator::new(&token_public).context("init jwt token validator")?;

        let evaluator =
            RulePolicyEvaluator::new(self.authz.rules.clone()).context("init policy rules")?;
        let mut authorizer = Authorizer::new(Arc::new(evaluator));
        if let Some(timeout_ms) = self.authz.timeout_ms {
            authorizer = authorizer.with_timeout(Duration::from_millis(timeout_ms));
        }

        let ctx = ServerContext {
            namer: Arc::new(PermissionNamer::new(self.namespace.as_str())?),
            authenticator: Arc::new(Authenticator::new(Arc::new(token_validator))),
            authorizer: Arc::new(authorizer),
            storage,
            token_generator: Arc::new(token_generator),
        };
        Ok(Arc::new(ctx))
    }

    pub fn build_restful_server(&self, ctx: Arc<ServerContext>) -> Result<RestfulServer> {
        let mut srv = RestfulServer::new(self.bind.clone(), ctx).context("build routes")?;
        if self.ssl {
            let ssl = self.build_ssl()?;
            srv.set_ssl(ssl);
        }

        if let Some(keep_alive_secs) = self.keep_alive_secs {
            srv.set_keep_alive_secs(keep_alive_secs);
        }

        if let Some(workers) = self.workers {
            srv.set_workers(workers);
        }

        if let Some(payload_limit_mib) = self.payload_limit_mib {
            srv.set_payload_limit_mib(payload_limit_mib);
        }

        Ok(srv)
    }

    fn read_jwt_keys(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let public_key_path = self.pki_dir.join("token_public.pem");
        let private_key_path = self.pki_dir.join("token_private.pem");
        if public_key_path.exists() && private_key_path.exists() {
            let public_key = fs::read(&public_key_path).context("read token public key")?;
            let private_key = fs::read(&private_key_path).context("read token private key")?;
            return Ok((public_key, private_key));
        }

        info!("Token keys for jwt not exists, try to generate new ones");
        let (public_key, private_key) =
            rsa::generate_rsa_keys().context("generate keys for token")?;

        fs::write(&public_key_path, &public_key).context("write token public key")?;
        fs::write(&private_key_path, &private_key).context("write token private key")?;

        Ok((public_key, private_key))
    }

    fn build_ssl(&self) -> Result<SslAcceptorBuilder> {
        let key_path = self.pki_dir.join("key.pem");
        if !key_path.exists() {
            bail!("ssl key file not exists: {:?}", key_path);
        }

        let cert_path = self.pki_dir.join("cert.pem");
        if !cert_path.exists() {
            bail!("ssl cert file not exists: {:?}", cert_path);
        }

        let mut builder =
            SslAcceptor::mozilla_intermediate(SslMethod::tls()).context("init ssl acceptor")?;

        builder
            .set_private_key_file(&key_path, SslFiletype::PEM)
            .context("load ssl key file")?;
        builder
            .set_certificate_chain_file(&cert_path)
            .context("load ssl cert file")?;

        Ok(builder)
    }

    fn default_bind() -> String {
        String::from("127.0.0.1:4444")
    }

    fn default_namespace() -> String {
        String::from("hydra")
    }
}

#[cfg(test)]
mod tests {
    use crate::authn::{CredentialVerifier, Subject};
    use crate::authz::rule::Effect;
    use crate::storage::config::StorageType;

    use super::*;

    fn temp_paths() -> PathSet {
        let root = env::temp_dir().join(format!("accountd-config-{}", uuid::Uuid::new_v4()));
        PathSet::new(Some(root.join("config")), Some(root.join("data"))).unwrap()
    }

    #[test]
    fn test_defaults() {
        let ps = temp_paths();
        let cfg: ServerConfig = ps.load_config("accountd", ServerConfig::default).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:4444");
        assert_eq!(cfg.namespace, "hydra");
        assert_eq!(cfg.authn.token_expiration_secs, 3600);
        assert_eq!(cfg.authz.timeout_ms, None);
        assert!(cfg.authz.rules.is_empty());
        assert_eq!(cfg.storage.storage_type, StorageType::Sqlite);
        assert_eq!(cfg.pki_dir, ps.pki_path);
        assert!(ps.pki_path.is_dir());
    }

    #[test]
    fn test_load() {
        let ps = temp_paths();
        fs::write(
            ps.config_path.join("accountd.toml"),
            r#"
            bind = "0.0.0.0:8080"
            namespace = "ory"

            [authn]
            token_expiration_secs = 600

            [authz]
            timeout_ms = 250

            [[authz.rules]]
            subjects = ["admin"]
            permissions = ["rn:ory:accounts*"]
            actions = ["*"]

            [[authz.rules]]
            subjects = ["*"]
            permissions = ["*"]
            actions = ["delete"]
            effect = "deny"

            [storage]
            type = "memory"
            "#,
        )
        .unwrap();

        let cfg: ServerConfig = ps.load_config("accountd", ServerConfig::default).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:8080");
        assert_eq!(cfg.namespace, "ory");
        assert_eq!(cfg.authn.token_expiration_secs, 600);
        assert_eq!(cfg.authz.timeout_ms, Some(250));
        assert_eq!(cfg.authz.rules.len(), 2);
        assert_eq!(cfg.authz.rules[1].effect, Effect::Deny);
        assert_eq!(cfg.storage.storage_type, StorageType::Memory);
    }

    #[test]
    fn test_invalid() {
        let cases = [
            "bind = \"\"",
            "namespace = \"a:b\"",
            "keep_alive_secs = 0",
            "workers = 0",
            "[authn]\ntoken_expiration_secs = 1",
            "[authz]\ntimeout_ms = 0",
            "[[authz.rules]]\nsubjects = []\npermissions = [\"*\"]\nactions = [\"*\"]",
        ];
        for case in cases {
            let ps = temp_paths();
            fs::write(ps.config_path.join("accountd.toml"), case).unwrap();
            let result = ps.load_config("accountd", ServerConfig::default);
            assert!(result.is_err(), "{case}");
        }
    }

    #[tokio::test]
    async fn test_build_ctx() {
        let ps = temp_paths();
        let mut cfg = ServerConfig::default();
        cfg.storage = toml::from_str("type = \"memory\"").unwrap();
        cfg.complete(&ps).unwrap();

        let ctx = cfg.build_ctx().unwrap();
        assert!(ps.pki_path.join("token_public.pem").exists());
        assert!(ps.pki_path.join("token_private.pem").exists());
        assert_eq!(ctx.namer.namespace(), "hydra");

        // Keys are reused on the next start
        let public_key = fs::read(ps.pki_path.join("token_public.pem")).unwrap();
        cfg.build_ctx().unwrap();
        assert_eq!(
            public_key,
            fs::read(ps.pki_path.join("token_public.pem")).unwrap()
        );

        let token = ctx
            .token_generator
            .generate_token(&Subject::new("u1"), chrono::Utc::now().timestamp() as u64)
            .unwrap();
        let validator = JwtTokenValidator::new(&public_key).unwrap();
        assert_eq!(validator.verify(&token.token).await.unwrap().id, "u1");
    }
}
