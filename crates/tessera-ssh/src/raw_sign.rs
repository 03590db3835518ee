// ABOUTME: Raw signatures over already-encoded data with an unencrypted private key.
// ABOUTME: RSA keys are rebuilt from both primes and always sign as rsa-sha2-512.

use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::BigUint;
use sha2::Sha512;
use ssh_key::private::{KeypairData, RsaKeypair};
use ssh_key::{Algorithm, HashAlg, Mpint, PrivateKey, Signature};

/// Sign `data` with `private_key`, returning the algorithm-tagged signature.
///
/// Ed25519 and ECDSA keys sign through ssh-key. RSA keys are converted to an
/// `rsa::RsaPrivateKey` here from `n`, `e`, `d`, `p` and `q`, and sign with
/// PKCS#1 v1.5 over SHA-512.
///
/// # Errors
/// `ssh_key::Error::Crypto` if the key is encrypted, inconsistent, or the
/// signing operation fails.
pub fn raw_signature(private_key: &PrivateKey, data: &[u8]) -> ssh_key::Result<Signature> {
    match private_key.key_data() {
        KeypairData::Rsa(keypair) => rsa_signature(keypair, data),
        _ => signature::Signer::try_sign(private_key, data).map_err(|_| ssh_key::Error::Crypto),
    }
}

fn rsa_signature(keypair: &RsaKeypair, data: &[u8]) -> ssh_key::Result<Signature> {
    let key = rsa::RsaPrivateKey::from_components(
        to_biguint(&keypair.public.n)?,
        to_biguint(&keypair.public.e)?,
        to_biguint(&keypair.private.d)?,
        vec![to_biguint(&keypair.private.p)?, to_biguint(&keypair.private.q)?],
    )
    .map_err(|_| ssh_key::Error::Crypto)?;

    let signature = SigningKey::<Sha512>::new(key)
        .try_sign(data)
        .map_err(|_| ssh_key::Error::Crypto)?;

    Signature::new(
        Algorithm::Rsa {
            hash: Some(HashAlg::Sha512),
        },
        signature.to_vec(),
    )
}

fn to_biguint(mpint: &Mpint) -> ssh_key::Result<BigUint> {
    mpint
        .as_positive_bytes()
        .map(BigUint::from_bytes_be)
        .ok_or(ssh_key::Error::Crypto)
}
