//! Header key normalization
//!
//! Regulator exports spell the same column many ways (`Código_do_grupo`,
//! `CODIGO DO GRUPO`, `codigo-do-grupo`). Every lookup compares tokens produced
//! by [`normalize`] instead of raw header text.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Canonicalize `text` into a lowercase ASCII alphanumeric token.
///
/// Accents are removed by NFD decomposition, everything outside `[a-z0-9]` is
/// dropped. The result of normalizing an already normalized token is the same
/// token.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Strip the directory part and the extension from a storage path or file name.
pub fn base_name(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    }
}

/// The final path segment of a storage path, extension included.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_accents_and_separators() {
        assert_eq!(normalize("Código_do_grupo"), "codigodogrupo");
        assert_eq!(normalize("Valor médio do bem (R$)"), "valormediodobemr");
        assert_eq!(normalize("  UF "), "uf");
        assert_eq!(normalize("Situação-Cotas/Ativas"), "situacaocotasativas");
    }

    #[test]
    fn test_normalize_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("--//__"), "");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("uploads/raw/202501_Imoveis.csv"), "202501_Imoveis");
        assert_eq!(base_name("Administradoras.xlsx"), "Administradoras");
        assert_eq!(base_name("uploads/raw/sem_extensao"), "sem_extensao");
        assert_eq!(base_name(".hidden"), ".hidden");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("uploads/raw/202501_Imoveis.csv"), "202501_Imoveis.csv");
        assert_eq!(file_name("plain.csv"), "plain.csv");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn normalize_only_emits_ascii_alphanumerics(s in "\\PC*") {
            prop_assert!(normalize(&s).chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}
