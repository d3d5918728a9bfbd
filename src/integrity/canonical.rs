// canonical.rs — Deterministic JSON serialization for manifest signing
//
// Canonical form: one compact JSON object, entries in byte-wise ascending
// path order, standard JSON string escaping. A manifest only holds string
// pairs, so the object is written straight from its ordered entries.
//
// RULE: The RSA signature is ALWAYS computed over canonical_manifest_bytes(),
// never over the pretty-printed signature.json on disk. Signer and Verifier
// both call this same function.

use crate::integrity::model::FileManifest;

/// The byte sequence that gets signed for a manifest.
pub fn canonical_manifest_bytes(manifest: &FileManifest) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    out.push(b'{');
    for (i, (path, digest)) in manifest.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut out, path)?;
        out.push(b':');
        serde_json::to_writer(&mut out, digest)?;
    }
    out.push(b'}');
    Ok(out)
}
