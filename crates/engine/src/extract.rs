use core::fmt::{self, Display};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The document looks like binary data.
    Binary,
    /// The document is not valid UTF-8.
    Encoding,
    /// The PDF could not be parsed.
    Pdf,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Binary => "The document does not contain plain text.",
            Self::Encoding => "The document is not encoded in UTF-8.",
            Self::Pdf => "The PDF could not be read.",
        })
    }
}

/// Turns an uploaded document into text.
pub trait Extract: Send + Sync {
    fn extract(&self, blob: &[u8]) -> Result<String, Error>;

    /// Like [`Extract::extract`], but may use the document's file name to pick a format.
    fn extract_named(&self, source: &str, blob: &[u8]) -> Result<String, Error> {
        let _ = source;
        self.extract(blob)
    }
}

/// Accepts UTF-8 text such as `.txt` and `.md` uploads.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainText;

impl Extract for PlainText {
    fn extract(&self, blob: &[u8]) -> Result<String, Error> {
        const BOM: &[u8] = b"\xEF\xBB\xBF";
        let blob = blob.strip_prefix(BOM).unwrap_or(blob);
        if blob.contains(&0) {
            return Err(Error::Binary);
        }

        let text = core::str::from_utf8(blob).map_err(|_| Error::Encoding)?;
        Ok(text.replace("\r\n", "\n"))
    }
}

/// Reads the text layer of a PDF.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pdf;

impl Extract for Pdf {
    fn extract(&self, blob: &[u8]) -> Result<String, Error> {
        // pdf-extract panics on some malformed files.
        match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(blob)) {
            Ok(Ok(text)) => Ok(text.replace("\r\n", "\n")),
            Ok(Err(err)) => {
                log::warn!("cannot extract text from PDF: {err}");
                Err(Error::Pdf)
            }
            Err(_) => {
                log::warn!("PDF extraction panicked");
                Err(Error::Pdf)
            }
        }
    }
}

/// Picks [`Pdf`] or [`PlainText`] by file extension, falling back to the PDF magic bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Documents;

impl Extract for Documents {
    fn extract(&self, blob: &[u8]) -> Result<String, Error> {
        if blob.starts_with(b"%PDF-") {
            Pdf.extract(blob)
        } else {
            PlainText.extract(blob)
        }
    }

    fn extract_named(&self, source: &str, blob: &[u8]) -> Result<String, Error> {
        let is_pdf = source.rsplit_once('.').is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            Pdf.extract(blob)
        } else {
            self.extract(blob)
        }
    }
}
