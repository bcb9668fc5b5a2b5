//! Signature completeness gate.
//!
//! Every signature produced during the protocol passes through here. A partial
//! signature must stay partial and a final one must be complete: an unexpectedly
//! complete signature means we hold keys we should not, so it is never sent on.

use escrow_bitcoin::RawTransactionClient;
use escrow_types::{EscrowError, Result};
use tracing::debug;

/// Signer errors expected while the counterparty's signature is still missing.
const MISSING_SIGNATURE_ERRORS: &[&str] = &[
    "Operation not valid with the current stack size",
    "Unable to sign input, invalid stack size (possibly missing key)",
];

/// Sign `rawtx` with the wallet and return the signed hex.
pub async fn sign_raw_tx(
    client: &dyn RawTransactionClient,
    rawtx: &str,
    should_be_complete: bool,
) -> Result<String> {
    let signed = client
        .sign_raw_transaction(rawtx)
        .await?
        .ok_or_else(|| EscrowError::protocol("Error signing transaction"))?;

    if let Some(errors) = signed.errors.as_ref().filter(|e| !e.is_empty()) {
        let tolerated = !should_be_complete
            && errors
                .iter()
                .all(|e| MISSING_SIGNATURE_ERRORS.contains(&e.error.as_str()));
        if !tolerated {
            let details: Vec<&str> = errors.iter().map(|e| e.error.as_str()).collect();
            return Err(EscrowError::protocol(format!(
                "Error signing transaction: {}",
                details.join("; ")
            )));
        }
    }

    if should_be_complete && !signed.complete {
        return Err(EscrowError::protocol(
            "Transaction should be complete at this stage.",
        ));
    }
    if !should_be_complete && signed.complete {
        return Err(EscrowError::protocol(
            "Transaction should not be complete at this stage, will not send insecure message",
        ));
    }

    debug!(complete = signed.complete, "Transaction signed");
    Ok(signed.hex)
}
