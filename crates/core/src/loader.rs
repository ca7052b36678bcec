use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Recursively lists `*.pdf` files (case-insensitive) under `folder`,
/// sorted by path. Unreadable directory entries are ignored.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && has_pdf_extension(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Loads every PDF under `folder`.
///
/// A missing folder or a folder without PDFs yields an empty report. Each
/// file is extracted in isolation, so one corrupt PDF is recorded in
/// `skipped_files` and the rest still load.
pub fn load_documents(folder: &Path, extractor: &dyn PdfExtractor) -> LoadReport {
    if !folder.is_dir() {
        warn!(path = %folder.display(), "pdf folder does not exist");
        return LoadReport::default();
    }

    let files = discover_pdf_files(folder);
    if files.is_empty() {
        warn!(path = %folder.display(), "no pdf files found");
        return LoadReport::default();
    }

    let mut report = LoadReport::default();
    for path in files {
        match load_document(&path, extractor) {
            Ok(document) => {
                debug!(path = %path.display(), pages = document.pages.len(), "loaded pdf");
                report.documents.push(document);
            }
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    report
}

fn load_document(path: &Path, extractor: &dyn PdfExtractor) -> Result<Document, IngestError> {
    if path.file_name().is_none() {
        return Err(IngestError::MissingFileName(path.display().to_string()));
    }

    let pages = extractor.extract_pages(path)?;
    Ok(Document {
        path: path.to_path_buf(),
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::{discover_pdf_files, load_documents};
    use crate::error::IngestError;
    use crate::extractor::fixtures::write_text_pdf;
    use crate::extractor::{LopdfExtractor, PdfExtractor};
    use crate::models::PageText;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    struct FailingOn(&'static str);

    impl PdfExtractor for FailingOn {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            if path.ends_with(self.0) {
                return Err(IngestError::PdfParse("boom".to_string()));
            }
            Ok(vec![PageText {
                number: 1,
                text: "text".to_string(),
            }])
        }
    }

    #[test]
    fn discovery_walks_subfolders_in_path_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        fs::create_dir_all(base.join("boards").join("rev2"))?;

        fs::write(base.join("ssd.pdf"), b"%PDF-1.4\n")?;
        fs::write(base.join("boards").join("rev2").join("GPU.PDF"), b"%PDF-1.4\n")?;
        fs::write(base.join("boards").join("bios.Pdf"), b"%PDF-1.4\n")?;
        fs::write(base.join("boards").join("errata.txt"), b"not a pdf")?;
        fs::create_dir(base.join("folder.pdf"))?;

        let names: Vec<_> = discover_pdf_files(base)
            .iter()
            .map(|path| path.strip_prefix(base).map(Path::to_path_buf))
            .collect::<Result<_, _>>()?;
        assert_eq!(
            names,
            vec![
                Path::new("boards").join("bios.Pdf"),
                Path::new("boards").join("rev2").join("GPU.PDF"),
                Path::new("ssd.pdf").to_path_buf(),
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_folder_yields_empty_report() {
        let report = load_documents(Path::new("/definitely/not/here"), &LopdfExtractor);
        assert!(report.documents.is_empty());
        assert!(report.skipped_files.is_empty());
    }

    #[test]
    fn empty_folder_yields_empty_report() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let report = load_documents(dir.path(), &LopdfExtractor);
        assert!(report.documents.is_empty());
        Ok(())
    }

    #[test]
    fn one_bad_file_does_not_abort_the_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            fs::write(dir.path().join(name), b"%PDF-1.4")?;
        }

        let report = load_documents(dir.path(), &FailingOn("b.pdf"));
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("b.pdf")
        );
        Ok(())
    }

    #[test]
    fn loads_real_pdf_and_skips_corrupt_one() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        write_text_pdf(&dir.path().join("cpu.pdf"), &["A CPU executes instructions."])?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let report = load_documents(dir.path(), &LopdfExtractor);
        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].path.ends_with("cpu.pdf"));
        assert_eq!(report.skipped_files.len(), 1);
        Ok(())
    }
}
