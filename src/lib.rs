pub mod authn;
pub mod authz;
pub mod config;
pub mod context;
pub mod guard;
pub mod handlers;
pub mod logs;
pub mod permission;
pub mod response;
pub mod restful;
pub mod rsa;
pub mod storage;
