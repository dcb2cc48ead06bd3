//! Output file naming convention.
//!
//! Single reports are written as `{business_id}_{locale}.pdf`; merged
//! paginated exports as `{business_id}_{locale}_{suffix}.pdf`. Ids are
//! used verbatim, so the only check is that the name stays a plain file
//! name inside the output directory.

use crate::error::CoreError;

/// File extension of every exported report.
pub const PDF_EXTENSION: &str = "pdf";

/// File name for a single exported report.
///
/// ```
/// use pbx_core::naming::report_file_name;
///
/// assert_eq!(report_file_name("1234567-8", "fi-FI").unwrap(), "1234567-8_fi-FI.pdf");
/// ```
pub fn report_file_name(business_id: &str, locale: &str) -> Result<String, CoreError> {
    let name = format!("{business_id}_{locale}.{PDF_EXTENSION}");
    validate_file_name(business_id, &name)?;
    Ok(name)
}

/// File name for a merged, paginated export.
///
/// ```
/// use pbx_core::naming::merged_file_name;
///
/// assert_eq!(
///     merged_file_name("1234567-8", "fi-FI", "merged").unwrap(),
///     "1234567-8_fi-FI_merged.pdf",
/// );
/// ```
pub fn merged_file_name(business_id: &str, locale: &str, suffix: &str) -> Result<String, CoreError> {
    let name = format!("{business_id}_{locale}_{suffix}.{PDF_EXTENSION}");
    validate_file_name(business_id, &name)?;
    Ok(name)
}

fn validate_file_name(business_id: &str, name: &str) -> Result<(), CoreError> {
    if business_id.is_empty() {
        return Err(CoreError::Validation(
            "Business id must not be empty".to_string(),
        ));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(CoreError::Validation(format!(
            "Report file name must not contain path separators, got: '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn report_name_embeds_id_and_locale() {
        assert_eq!(
            report_file_name("0112038-9", "en-US").unwrap(),
            "0112038-9_en-US.pdf"
        );
    }

    #[test]
    fn merged_name_appends_suffix() {
        assert_eq!(
            merged_file_name("0112038-9", "fi-FI", "full").unwrap(),
            "0112038-9_fi-FI_full.pdf"
        );
    }

    #[test]
    fn empty_id_rejected() {
        assert_matches!(report_file_name("", "fi-FI"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn path_separator_rejected() {
        assert_matches!(
            report_file_name("../etc/passwd", "fi-FI"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            merged_file_name("a\\b", "fi-FI", "merged"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn unusual_ids_pass_through() {
        assert_eq!(
            report_file_name("FI 1234567-8 ", "fi-FI").unwrap(),
            "FI 1234567-8 _fi-FI.pdf"
        );
    }
}
