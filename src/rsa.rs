use anyhow::{Context, Result};
use openssl::pkey::PKey;
use openssl::rsa::Rsa;

const KEY_BITS: u32 = 2048;

/// Generates the RSA key pair used to sign and verify access tokens.
///
/// Returns `(public_key, private_key)`, the private key in PKCS#8 PEM and
/// the public key in SubjectPublicKeyInfo PEM, which is what the token
/// generator and validator expect.
pub fn generate_rsa_keys() -> Result<(Vec<u8>, Vec<u8>)> {
    let rsa = Rsa::generate(KEY_BITS).context("generate rsa key")?;
    let pkey = PKey::from_rsa(rsa)?;

    let private_key = pkey.private_key_to_pem_pkcs8()?;
    let public_key = pkey.public_key_to_pem()?;

    Ok((public_key, private_key))
}
