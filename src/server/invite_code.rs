use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// Tentativi di inserimento prima di arrendersi a una collisione
pub const MAX_INVITE_CODE_ATTEMPTS: usize = 5;

/// Codice invito opaco: `n_bytes` casuali dal CSPRNG del thread, in base64
/// URL-safe senza padding. Non dipende in alcun modo dai dati del gruppo.
pub fn generate(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Normalizza il codice inserito dall'utente (spazi, a capo da copia-incolla).
pub fn normalize(input: &str) -> Option<&str> {
    let code = input.trim();
    (!code.is_empty()).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_have_expected_shape() {
        let code = generate(9);
        assert_eq!(code.len(), 12);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn codes_do_not_repeat() {
        let codes: HashSet<String> = (0..1000).map(|_| generate(9)).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn normalize_trims_and_rejects_blank() {
        assert_eq!(normalize("  AbC-12 \n"), Some("AbC-12"));
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize(""), None);
    }
}
