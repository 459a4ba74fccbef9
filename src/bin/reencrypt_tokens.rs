use anyhow::{Context, Result, anyhow};
use websync::{
    config::ConfigLoader,
    crypto::{CryptoKey, decrypt_connection_tokens, encrypt_connection_tokens},
    db,
    repositories::ConnectionRepository,
};

/// Upgrades legacy plaintext/base64 tokens to the AEAD envelope format.
#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::new().load().context("loading configuration")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    let connections = ConnectionRepository::new(db.clone());

    let mut updated_count = 0usize;

    for connection in connections.list_all().await.map_err(|e| anyhow!(e.message))? {
        let tokens = decrypt_connection_tokens(&crypto_key, &connection)
            .with_context(|| format!("decrypting tokens for connection {}", connection.id))?;
        if !tokens.needs_reencryption {
            continue;
        }

        let (access_cipher, refresh_cipher) = encrypt_connection_tokens(
            &crypto_key,
            &connection,
            tokens.access_token.as_deref(),
            tokens.refresh_token.as_deref(),
        )
        .with_context(|| format!("re-encrypting tokens for connection {}", connection.id))?;

        connections
            .update_tokens(connection.id, access_cipher, refresh_cipher)
            .await
            .map_err(|e| anyhow!("updating connection {}: {}", connection.id, e.message))?;
        updated_count += 1;
    }

    println!(
        "Re-encrypted {} connection(s) containing legacy tokens.",
        updated_count
    );

    Ok(())
}
