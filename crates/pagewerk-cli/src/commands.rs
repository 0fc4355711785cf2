// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand implementations. Files are read and written with `tokio::fs`;
// document work runs to completion between those suspend points.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pagewerk_core::config::AppConfig;
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::{
    CompressionLevel, ImageLayoutMode, PageRange, RgbColor, RotationDirection, SessionId,
    WatermarkPosition,
};
use pagewerk_document::{
    Composer, ImageComposer, PdfLibrary, RangeSet, Session, WatermarkContent, WatermarkSpec,
};
use tracing::{info, warn};

/// Default output of `merge`.
const MERGED_NAME: &str = "merged.pdf";

/// Default output of `images`.
const IMAGES_NAME: &str = "high-quality-images.pdf";

/// A quarter turn requested for one page (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTurn {
    pub page: usize,
    pub direction: RotationDirection,
}

/// Watermark settings from the command line; unset fields fall back to the
/// configured defaults.
#[derive(Debug, Default)]
pub struct WatermarkArgs {
    pub text: Option<String>,
    pub image: Option<PathBuf>,
    pub color: Option<String>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
    pub size_percent: Option<f32>,
    pub position: Option<WatermarkPosition>,
}

/// Configuration plus the session every command runs in.
pub struct Workspace {
    config: AppConfig,
    session: Session,
}

impl Workspace {
    pub fn new(config: AppConfig) -> Self {
        let session = Session::new(config.max_repair_runs);
        Self { config, session }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub async fn merge(&self, inputs: &[PathBuf], output: Option<PathBuf>) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;

        let mut sources = Vec::with_capacity(inputs.len());
        for path in inputs {
            sources.push(tokio::fs::read(path).await?);
        }
        let refs: Vec<&[u8]> = sources.iter().map(Vec::as_slice).collect();

        let merged = Composer::new(&PdfLibrary).merge(&refs)?;
        let output = output.unwrap_or_else(|| PathBuf::from(MERGED_NAME));
        write_output(&output, &merged).await?;
        Ok(vec![output])
    }

    pub async fn split(
        &self,
        input: &Path,
        ranges: Vec<PageRange>,
        dir: Option<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;
        let source = tokio::fs::read(input).await?;
        let composer = Composer::new(&PdfLibrary);

        let page_count = composer.page_count(&source)? as u32;
        let ranges = RangeSet::from_ranges(page_count, name_ranges(ranges));

        // Every output is produced before anything is written.
        let outputs = composer.split(&source, ranges.ranges())?;

        let dir = dir.unwrap_or_else(|| parent_dir(input));
        tokio::fs::create_dir_all(&dir).await?;

        let mut taken = HashSet::new();
        let mut staged = Vec::with_capacity(outputs.len());
        for output in &outputs {
            let name = unique_file_name(&mut taken, &output.name);
            let part = dir.join(format!(".{name}.part"));
            if let Err(err) = tokio::fs::write(&part, &output.bytes).await {
                warn!(path = %part.display(), error = %err, "split output not staged");
                discard(&staged).await;
                return Err(err.into());
            }
            staged.push((part, dir.join(name)));
        }

        let mut written = Vec::with_capacity(staged.len());
        for (index, (part, path)) in staged.iter().enumerate() {
            if let Err(err) = tokio::fs::rename(part, path).await {
                discard(&staged[index..]).await;
                return Err(err.into());
            }
            info!(path = %path.display(), "output written");
            written.push(path.clone());
        }
        Ok(written)
    }

    pub async fn rotate(
        &self,
        input: &Path,
        turns: &[PageTurn],
        all: Option<RotationDirection>,
        output: Option<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;
        let source = tokio::fs::read(input).await?;
        let composer = Composer::new(&PdfLibrary);

        let mut tracker = composer.rotation_tracker(&source)?;
        if let Some(direction) = all {
            tracker.rotate_all(direction);
        }
        for turn in turns {
            if turn.page == 0 {
                return Err(PagewerkError::InvalidInput("page numbers start at 1".into()));
            }
            tracker.rotate(turn.page - 1, turn.direction)?;
        }
        if !tracker.is_dirty() {
            warn!("no page rotation changed, saving a copy");
        }

        let rotated = composer.rotate(&source, &tracker)?;
        let output = match output {
            Some(path) => path,
            None => prefixed(input, "rotated_")?,
        };
        write_output(&output, &rotated).await?;
        Ok(vec![output])
    }

    pub async fn watermark(
        &self,
        input: &Path,
        args: WatermarkArgs,
        output: Option<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;
        let source = tokio::fs::read(input).await?;
        let defaults = &self.config.watermark;

        let mut spec = match (args.image, args.text) {
            (Some(image), _) => WatermarkSpec::image(tokio::fs::read(image).await?, defaults),
            (None, Some(text)) => WatermarkSpec::text(text, defaults),
            (None, None) => WatermarkSpec::from_defaults(defaults),
        };
        if let (Some(hex), WatermarkContent::Text { color, .. }) = (&args.color, &mut spec.content) {
            *color = RgbColor::from_hex(hex)?;
        }
        spec.opacity = args.opacity.unwrap_or(spec.opacity);
        spec.rotation = args.rotation.unwrap_or(spec.rotation);
        spec.size_percent = args.size_percent.unwrap_or(spec.size_percent);
        spec.position = args.position.unwrap_or(spec.position);

        let stamped = Composer::new(&PdfLibrary).watermark(&source, &spec)?;
        let output = match output {
            Some(path) => path,
            None => prefixed(input, "watermarked_")?,
        };
        write_output(&output, &stamped).await?;
        Ok(vec![output])
    }

    pub async fn images(
        &self,
        images: &[PathBuf],
        mode: ImageLayoutMode,
        output: Option<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;

        let mut sources = Vec::with_capacity(images.len());
        for path in images {
            sources.push(tokio::fs::read(path).await?);
        }
        let refs: Vec<&[u8]> = sources.iter().map(Vec::as_slice).collect();

        let pdf = ImageComposer::from_config(&self.config).compose(&refs, mode)?;
        let output = output.unwrap_or_else(|| PathBuf::from(IMAGES_NAME));
        write_output(&output, &pdf).await?;
        Ok(vec![output])
    }

    pub async fn compress(
        &self,
        input: &Path,
        level: Option<CompressionLevel>,
        output: Option<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;
        let source = tokio::fs::read(input).await?;
        let level = level.unwrap_or(self.config.compression_level);

        let report = Composer::new(&PdfLibrary).compress(&source, level)?;
        info!(
            original = report.original_size,
            compressed = report.compressed_size,
            "size change"
        );

        let output = match output {
            Some(path) => path,
            None => prefixed(input, "compressed_")?,
        };
        write_output(&output, &report.bytes).await?;
        Ok(vec![output])
    }

    /// Run the recovery cascade until it succeeds or the run cap is used up.
    pub async fn repair(&mut self, input: &Path, output: Option<PathBuf>) -> Result<Vec<PathBuf>> {
        let _guard = self.session.begin()?;
        let source = tokio::fs::read(input).await?;
        let cascade = self.session.repair_mut();

        let report = loop {
            match cascade.run(&PdfLibrary, &source) {
                Ok(report) => break report,
                Err(PagewerkError::RepairExhausted(reason)) if cascade.remaining_runs() > 0 => {
                    warn!(remaining = cascade.remaining_runs(), %reason, "repair run failed");
                }
                Err(err) => return Err(err),
            }
        };

        info!(
            method = report.strategy.label(),
            pages = report.page_count,
            skipped = report.skipped_pages.len(),
            "document recovered"
        );

        let output = match output {
            Some(path) => path,
            None => prefixed(input, "repaired_")?,
        };
        write_output(&output, &report.bytes).await?;
        Ok(vec![output])
    }
}

/// Parse `START-END[:NAME]` or `PAGE[:NAME]`.
pub fn parse_range(value: &str) -> std::result::Result<PageRange, String> {
    let (span, name) = match value.split_once(':') {
        Some((span, name)) => (span, name.trim()),
        None => (value, ""),
    };
    let (start, end) = match span.split_once('-') {
        Some((start, end)) => (start, end),
        None => (span, span),
    };

    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|_| format!("'{part}' is not a page number"))
    };
    Ok(PageRange::new(parse(start)?, parse(end)?, name))
}

/// Parse `PAGE:cw` or `PAGE:ccw`.
pub fn parse_turn(value: &str) -> std::result::Result<PageTurn, String> {
    let (page, direction) = value
        .split_once(':')
        .ok_or_else(|| format!("expected PAGE:cw or PAGE:ccw, got '{value}'"))?;

    let page = page
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("'{page}' is not a page number"))?;
    let direction = match direction.trim().to_ascii_lowercase().as_str() {
        "cw" => RotationDirection::Clockwise,
        "ccw" => RotationDirection::CounterClockwise,
        other => return Err(format!("unknown direction '{other}', use cw or ccw")),
    };
    Ok(PageTurn { page, direction })
}

/// Unnamed ranges get "Split N" after their position.
fn name_ranges(ranges: Vec<PageRange>) -> Vec<PageRange> {
    ranges
        .into_iter()
        .enumerate()
        .map(|(index, mut range)| {
            if range.name.is_empty() {
                range.name = format!("Split {}", index + 1);
            }
            range
        })
        .collect()
}

/// `name.pdf`, or `name (2).pdf`, `name (3).pdf`, ... when an earlier range
/// already claimed it. Compared case-insensitively.
fn unique_file_name(taken: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = format!("{name}.pdf");
    let mut copy = 1;
    while !taken.insert(candidate.to_lowercase()) {
        copy += 1;
        candidate = format!("{name} ({copy}).pdf");
    }
    candidate
}

/// Remove staged split parts; failures are only logged.
async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (part, _) in staged {
        if let Err(err) = tokio::fs::remove_file(part).await {
            warn!(path = %part.display(), error = %err, "staged part not removed");
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `dir/name.pdf` → `dir/{prefix}name.pdf`.
fn prefixed(input: &Path, prefix: &str) -> Result<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| PagewerkError::InvalidInput(format!("{} has no file name", input.display())))?;
    Ok(input.with_file_name(format!("{prefix}{}", name.to_string_lossy())))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "output written");
    Ok(())
}
