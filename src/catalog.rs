//! Built-in converters offered by the conversion service.
//!
//! Each entry is a [`ConverterSpec`]: endpoint path, accepted inputs, output
//! naming and default option fields. Size ceilings match what the service
//! rejects server-side, so oversized files fail before upload.

use crate::config::{ConverterSpec, PageSize, UploadOptions, DEFAULT_MAX_FILES};
use crate::download::RenameRule;
use crate::error::ConvertError;
use crate::select::AcceptList;

const MB: u64 = 1024 * 1024;

/// Names of every built-in converter, in display order.
pub const CONVERTER_NAMES: &[&str] = &[
    "pdf-to-docx",
    "pdf-to-jpg",
    "pdf-to-excel",
    "pdf-to-pptx",
    "pdf-to-txt",
    "docx-to-pdf",
    "images-to-pdf",
    "excel-to-pdf",
    "pptx-to-pdf",
    "txt-to-pdf",
];

fn pdf_input() -> AcceptList {
    AcceptList::extensions(&["pdf"]).with_mime(&["application/pdf"])
}

/// Look up a built-in converter by name (case-insensitive).
pub fn lookup(name: &str) -> Result<ConverterSpec, ConvertError> {
    let spec = match name.trim().to_ascii_lowercase().as_str() {
        "pdf-to-docx" => ConverterSpec::new(
            "pdf-to-docx",
            "/api/pdf-to-docx/",
            pdf_input(),
            RenameRule::replace_extension(&["pdf"], "docx"),
        )
        .title("PDF → Word")
        .max_bytes(50 * MB),

        "pdf-to-jpg" => ConverterSpec::new(
            "pdf-to-jpg",
            "/api/pdf-to-jpg/",
            pdf_input(),
            RenameRule::replace_extension(&["pdf"], "jpg"),
        )
        .title("PDF → JPG")
        .accepted_options(&["dpi", "first_page_only"])
        .max_bytes(50 * MB),

        "pdf-to-excel" => ConverterSpec::new(
            "pdf-to-excel",
            "/api/pdf-to-excel/",
            pdf_input(),
            RenameRule::replace_extension(&["pdf"], "xlsx"),
        )
        .title("PDF → Excel")
        .max_bytes(50 * MB),

        "pdf-to-pptx" => ConverterSpec::new(
            "pdf-to-pptx",
            "/api/pdf-to-pptx/",
            pdf_input(),
            RenameRule::replace_extension(&["pdf"], "pptx"),
        )
        .title("PDF → PowerPoint")
        .accepted_options(&["dpi"])
        .max_bytes(50 * MB),

        "pdf-to-txt" => ConverterSpec::new(
            "pdf-to-txt",
            "/api/pdf-to-txt/",
            pdf_input(),
            RenameRule::replace_extension(&["pdf"], "txt"),
        )
        .title("PDF → Text")
        .accepted_options(&["ocr", "lang", "join_pages", "preserve_layout"])
        .max_bytes(50 * MB),

        "docx-to-pdf" => ConverterSpec::new(
            "docx-to-pdf",
            "/api/docx-to-pdf/",
            AcceptList::extensions(&["doc", "docx"]).with_mime(&[
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ]),
            RenameRule::replace_extension(&["doc", "docx"], "pdf"),
        )
        .title("Word → PDF")
        .max_bytes(50 * MB),

        "images-to-pdf" => ConverterSpec::new(
            "images-to-pdf",
            "/api/images-to-pdf/",
            AcceptList::extensions(&["jpg", "jpeg", "png"]).with_mime(&["image/*"]),
            RenameRule::fixed("images.pdf"),
        )
        .title("Images → PDF")
        .multiple(DEFAULT_MAX_FILES),

        "excel-to-pdf" => ConverterSpec::new(
            "excel-to-pdf",
            "/api/excel-to-pdf/",
            AcceptList::extensions(&["xls", "xlsx"]).with_mime(&[
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ]),
            RenameRule::replace_extension(&["xls", "xlsx"], "pdf"),
        )
        .title("Excel → PDF")
        .fields(UploadOptions::default().backend("reportlab").page_size(PageSize::A4))
        .accepted_options(&["backend", "page_size"])
        .max_bytes(50 * MB),

        "pptx-to-pdf" => ConverterSpec::new(
            "pptx-to-pdf",
            "/api/pptx-to-pdf/",
            AcceptList::extensions(&["ppt", "pptx"]).with_mime(&[
                "application/vnd.ms-powerpoint",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ]),
            RenameRule::replace_extension(&["ppt", "pptx"], "pdf"),
        )
        .title("PowerPoint → PDF")
        .max_bytes(100 * MB),

        "txt-to-pdf" => ConverterSpec::new(
            "txt-to-pdf",
            "/api/txt-to-pdf/",
            AcceptList::extensions(&["txt"]),
            RenameRule::replace_extension(&["txt"], "pdf"),
        )
        .title("Text → PDF")
        .max_bytes(20 * MB),

        _ => {
            return Err(ConvertError::UnknownConverter {
                name: name.to_string(),
            })
        }
    };
    Ok(spec)
}

/// Every built-in converter.
pub fn all() -> Vec<ConverterSpec> {
    CONVERTER_NAMES
        .iter()
        .filter_map(|name| lookup(name).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_resolves() {
        assert_eq!(all().len(), CONVERTER_NAMES.len());
        for spec in all() {
            assert!(spec.endpoint.starts_with("/api/"), "{}", spec.name);
            assert!(spec.endpoint.ends_with('/'), "{}", spec.name);
            assert!(spec.endpoint.contains(&spec.name), "{}", spec.name);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup(" PDF-to-DOCX ").unwrap().name, "pdf-to-docx");
    }

    #[test]
    fn unknown_name_errors() {
        assert!(matches!(
            lookup("pdf-to-midi"),
            Err(ConvertError::UnknownConverter { .. })
        ));
    }

    #[test]
    fn only_images_to_pdf_is_multi_file() {
        let multi: Vec<_> = all().into_iter().filter(|s| s.multiple).map(|s| s.name).collect();
        assert_eq!(multi, vec!["images-to-pdf"]);
        assert_eq!(lookup("images-to-pdf").unwrap().max_files, 20);
    }

    #[test]
    fn docx_to_pdf_renames_both_word_formats() {
        let spec = lookup("docx-to-pdf").unwrap();
        assert_eq!(spec.rename_rule.apply(&["memo.doc"]), "memo.pdf");
        assert_eq!(spec.rename_rule.apply(&["memo.docx"]), "memo.pdf");
        assert!(spec.accept.matches("memo.DOCX", None));
        assert!(!spec.accept.matches("memo.pdf", None));
    }

    #[test]
    fn excel_defaults_are_sent() {
        let spec = lookup("excel-to-pdf").unwrap();
        let fields = spec.form_fields(&UploadOptions::default());
        assert_eq!(
            fields,
            vec![
                ("backend".to_string(), "reportlab".to_string()),
                ("page_size".to_string(), "A4".to_string()),
            ]
        );
    }

    #[test]
    fn pdf_to_txt_ignores_dpi() {
        let spec = lookup("pdf-to-txt").unwrap();
        let fields = spec.form_fields(&UploadOptions::default().dpi(300).ocr(false).lang("eng"));
        assert_eq!(
            fields,
            vec![
                ("ocr".to_string(), "false".to_string()),
                ("lang".to_string(), "eng".to_string()),
            ]
        );
    }

    #[test]
    fn images_accept_by_mime_family() {
        let spec = lookup("images-to-pdf").unwrap();
        assert!(spec.accept.matches("photo.PNG", None));
        assert!(spec.accept.matches("photo.webp", None));
        assert!(!spec.accept.matches("doc.pdf", None));
    }
}
