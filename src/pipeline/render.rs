use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;

use crate::error::AppError;
use crate::llm::ImageInput;

/// Rasterizes the first page of a document into PNG bytes.
pub trait PageRenderer: Send + Sync {
    fn render_first_page(&self, path: &Path) -> anyhow::Result<Vec<u8>>;
}

/// Renders PDFs through pdfium. The library is bound per call so a missing
/// pdfium only fails the documents that need it.
pub struct PdfiumRenderer {
    library_path: Option<PathBuf>,
    dpi: u16,
}

impl PdfiumRenderer {
    pub fn new(library_path: Option<PathBuf>, dpi: u16) -> Self {
        Self { library_path, dpi }
    }

    fn bind(&self) -> anyhow::Result<Pdfium> {
        let bindings = match &self.library_path {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))?
            }
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_first_page(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let pdfium = self.bind()?;
        let document = pdfium.load_pdf_from_file(path, None)?;
        let page = document.pages().get(0)?;

        let scale = f32::from(self.dpi) / 72.0;
        let bitmap = page.render_with_config(&PdfRenderConfig::new().scale_page_by_factor(scale))?;

        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or_else(|| anyhow::anyhow!("bitmap size does not match {width}x{height}"))?;

        encode_rgb_png(DynamicImage::ImageRgba8(rgba))
    }
}

fn encode_rgb_png(image: DynamicImage) -> anyhow::Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Turns a stored document into an image the vision model can read.
#[derive(Clone)]
pub struct DocumentImager {
    renderer: Arc<dyn PageRenderer>,
}

impl DocumentImager {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    #[tracing::instrument(name = "pipeline.load_image", skip(self), fields(image.bytes))]
    pub async fn load(&self, path: &Path) -> Result<ImageInput, AppError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let (media_type, bytes) = match ext.as_str() {
            "pdf" => {
                let renderer = self.renderer.clone();
                let owned = path.to_path_buf();
                let png = tokio::task::spawn_blocking(move || renderer.render_first_page(&owned))
                    .await
                    .map_err(|e| AppError::Internal(format!("render task failed: {e}")))?
                    .map_err(|e| {
                        AppError::Pipeline(format!("failed to render {}: {e}", path.display()))
                    })?;
                ("image/png", png)
            }
            "png" => ("image/png", tokio::fs::read(path).await?),
            "jpg" | "jpeg" => ("image/jpeg", tokio::fs::read(path).await?),
            "webp" => ("image/webp", tokio::fs::read(path).await?),
            other => {
                return Err(AppError::Validation(format!(
                    "unsupported document format '{other}'"
                )));
            }
        };

        tracing::Span::current().record("image.bytes", bytes.len());

        Ok(ImageInput {
            media_type: media_type.to_string(),
            data_base64: STANDARD.encode(&bytes),
        })
    }
}
