//! Texture attribute (`.txa`) files.
//!
//! Each rule line lists name patterns, a colon, then requests applied to
//! textures whose name (file stem) matches:
//!
//! ```text
//! # halve everything, keep UI crisp
//! ui_* : 100% nearest keep-format
//! *_env : 256 256 mipmap anisotropic 4
//! * : 50%
//! :powertwo 1
//! ```
//!
//! The first matching rule wins unless it carries `cont`, in which case
//! later matching rules are merged on top. Lines starting with `:` set
//! global options.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::texture::{MAX_TEXTURE_SIZE, SamplerFilter, TextureFormat};

#[derive(Debug, Error)]
pub enum TxaError {
    #[error("line {line}: expected 'patterns : requests'")]
    MissingColon { line: usize },
    #[error("line {line}: invalid request '{token}'")]
    InvalidRequest { line: usize, token: String },
    #[error("line {line}: invalid value for :{keyword}")]
    InvalidGlobal { line: usize, keyword: String },
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SizeRequest {
    Explicit { x: u32, y: u32 },
    /// Percentage of the source size.
    Scale(f32),
}

/// What a matching rule asks for. `None` fields leave the texture alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TxaRequest {
    pub size: Option<SizeRequest>,
    pub omit: bool,
    pub keep_format: bool,
    pub format: Option<TextureFormat>,
    pub min_filter: Option<SamplerFilter>,
    pub mag_filter: Option<SamplerFilter>,
    pub anisotropic_degree: Option<u32>,
}

impl TxaRequest {
    /// Layer a later rule's request over this one.
    pub fn merge(&mut self, later: &TxaRequest) {
        self.size = later.size.or(self.size);
        self.omit |= later.omit;
        self.keep_format |= later.keep_format;
        self.format = later.format.or(self.format);
        self.min_filter = later.min_filter.or(self.min_filter);
        self.mag_filter = later.mag_filter.or(self.mag_filter);
        self.anisotropic_degree = later.anisotropic_degree.or(self.anisotropic_degree);
    }
}

#[derive(Clone, Debug)]
struct TxaLine {
    patterns: Vec<Vec<char>>,
    request: TxaRequest,
    cont: bool,
}

impl TxaLine {
    fn matches(&self, name: &[char]) -> bool {
        self.patterns.iter().any(|p| glob_match(p, name))
    }
}

#[derive(Clone, Debug, Default)]
pub struct TxaFile {
    lines: Vec<TxaLine>,
    powertwo: bool,
    imagetype: Option<String>,
}

impl TxaFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, TxaError> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|source| TxaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&src)
    }

    pub fn parse(src: &str) -> Result<Self, TxaError> {
        let mut txa = TxaFile::new();
        let mut pending = String::new();
        let mut start_line = 0;

        for (idx, raw) in src.lines().enumerate() {
            let text = raw.split('#').next().unwrap_or("").trim_end();
            if pending.is_empty() {
                start_line = idx + 1;
            }
            if let Some(head) = text.strip_suffix('\\') {
                pending.push_str(head);
                pending.push(' ');
                continue;
            }
            pending.push_str(text);
            let line = std::mem::take(&mut pending);
            txa.parse_line(line.trim(), start_line)?;
        }
        if !pending.is_empty() {
            txa.parse_line(pending.trim(), start_line)?;
        }
        Ok(txa)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn num_rules(&self) -> usize {
        self.lines.len()
    }

    /// Whether computed sizes are rounded down to a power of two.
    pub fn powertwo(&self) -> bool {
        self.powertwo
    }

    pub fn imagetype(&self) -> Option<&str> {
        self.imagetype.as_deref()
    }

    /// Combined request of the rules matching `name`, if any matches.
    pub fn match_texture(&self, name: &str) -> Option<TxaRequest> {
        let name: Vec<char> = name.chars().collect();
        let mut result: Option<TxaRequest> = None;
        for line in &self.lines {
            if !line.matches(&name) {
                continue;
            }
            result.get_or_insert_with(TxaRequest::default).merge(&line.request);
            if !line.cont {
                break;
            }
        }
        result
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> Result<(), TxaError> {
        if line.is_empty() {
            return Ok(());
        }
        if let Some(global) = line.strip_prefix(':') {
            return self.parse_global(global, line_no);
        }

        let (lhs, rhs) = line
            .split_once(':')
            .ok_or(TxaError::MissingColon { line: line_no })?;
        // `line` is trimmed and does not start with ':', so `lhs` has a word.
        let patterns: Vec<Vec<char>> = lhs
            .split_whitespace()
            .map(|p| p.chars().collect())
            .collect();

        let (request, cont) = parse_requests(rhs, line_no)?;
        self.lines.push(TxaLine {
            patterns,
            request,
            cont,
        });
        Ok(())
    }

    fn parse_global(&mut self, body: &str, line_no: usize) -> Result<(), TxaError> {
        let mut words = body.split_whitespace();
        let Some(keyword) = words.next() else {
            return Ok(());
        };
        let invalid = || TxaError::InvalidGlobal {
            line: line_no,
            keyword: keyword.to_owned(),
        };
        match keyword {
            "powertwo" => {
                self.powertwo = match words.next() {
                    None | Some("1") => true,
                    Some("0") => false,
                    Some(_) => return Err(invalid()),
                };
            }
            "imagetype" => {
                self.imagetype = Some(words.next().ok_or_else(invalid)?.to_owned());
            }
            other => log::warn!("txa line {}: ignoring unsupported option :{}", line_no, other),
        }
        Ok(())
    }
}

fn parse_requests(rhs: &str, line_no: usize) -> Result<(TxaRequest, bool), TxaError> {
    let tokens: Vec<&str> = rhs.split_whitespace().collect();
    let invalid = |token: &str| TxaError::InvalidRequest {
        line: line_no,
        token: token.to_owned(),
    };

    let mut request = TxaRequest::default();
    let mut cont = false;
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match token {
            "omit" => request.omit = true,
            "keep-format" => request.keep_format = true,
            "cont" => cont = true,
            "rgba" => request.format = Some(TextureFormat::Rgba8),
            "rgb" => request.format = Some(TextureFormat::Rgb8),
            "luminance" => request.format = Some(TextureFormat::Luminance8),
            "luminance_alpha" => request.format = Some(TextureFormat::LuminanceAlpha8),
            "nearest" => {
                request.min_filter = Some(SamplerFilter::Nearest);
                request.mag_filter = Some(SamplerFilter::Nearest);
            }
            "linear" => {
                request.min_filter = Some(SamplerFilter::Linear);
                request.mag_filter = Some(SamplerFilter::Linear);
            }
            "mipmap" => request.min_filter = Some(SamplerFilter::Mipmap),
            "anisotropic" => {
                let degree = tokens
                    .get(i + 1)
                    .and_then(|t| t.parse::<u32>().ok())
                    .filter(|d| *d >= 1)
                    .ok_or_else(|| invalid(token))?;
                request.anisotropic_degree = Some(degree);
                i += 1;
            }
            // Palette placement options; they take one argument and have
            // no effect on a single texture.
            "margin" | "coverage" => {
                log::debug!("txa line {}: ignoring palette option {}", line_no, token);
                i += 1;
            }
            _ if token.ends_with('%') => {
                let pct = token[..token.len() - 1]
                    .parse::<f32>()
                    .ok()
                    .filter(|p| *p > 0.0 && p.is_finite())
                    .ok_or_else(|| invalid(token))?;
                request.size = Some(SizeRequest::Scale(pct));
            }
            _ if token.starts_with(|c: char| c.is_ascii_digit()) => {
                let x = token.parse::<u32>().map_err(|_| invalid(token))?;
                let y = tokens
                    .get(i + 1)
                    .and_then(|t| t.parse::<u32>().ok())
                    .ok_or_else(|| invalid(token))?;
                if x == 0 || y == 0 || x > MAX_TEXTURE_SIZE || y > MAX_TEXTURE_SIZE {
                    return Err(invalid(token));
                }
                request.size = Some(SizeRequest::Explicit { x, y });
                i += 1;
            }
            _ => return Err(invalid(token)),
        }
        i += 1;
    }
    Ok((request, cont))
}

/// Shell-style wildcard match: `*`, `?` and `[...]` classes (`!` or `^`
/// negates, `a-z` ranges).
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('[') => match match_class(pattern, p + 1, text[t]) {
                Some((true, next)) => Some(next),
                Some((false, _)) => None,
                // unterminated class: literal '['
                None => (text[t] == '[').then_some(p + 1),
            },
            Some(c) => (*c == text[t]).then_some(p + 1),
            None => None,
        };

        if let Some(next) = step {
            p = next;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start;
    let negate = matches!(pattern.get(i), Some('!' | '^'));
    if negate {
        i += 1;
    }
    let first = i;
    let mut matched = false;
    while let Some(&lo) = pattern.get(i) {
        if lo == ']' && i > first {
            return Some((matched != negate, i + 1));
        }
        match (pattern.get(i + 1), pattern.get(i + 2)) {
            (Some('-'), Some(&hi)) if hi != ']' => {
                matched |= lo <= c && c <= hi;
                i += 3;
            }
            _ => {
                matched |= lo == c;
                i += 1;
            }
        }
    }
    None
}
