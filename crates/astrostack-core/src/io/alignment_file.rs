use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::align::{AlignmentResult, LocalShiftsHandler};
use crate::error::{Result, StackerError};
use crate::frame::InputFrame;

const REFERENCE_HEADER: &str = "reference_file";
const COLUMNS_COMMENT: &str = "# file | frame_number | shift_x | shift_y | rotation_center_x | \
rotation_center_y | rotation | ranking | local_shifts [| zoom]";

/// Alignment results keyed by frame, as persisted between `align` and `stack`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignmentFile {
    pub reference: Option<InputFrame>,
    pub entries: BTreeMap<InputFrame, AlignmentResult>,
}

impl AlignmentFile {
    pub fn new(reference: Option<InputFrame>) -> Self {
        Self {
            reference,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, frame: InputFrame, result: AlignmentResult) {
        self.entries.insert(frame, result);
    }

    pub fn get(&self, frame: &InputFrame) -> Option<&AlignmentResult> {
        self.entries.get(frame)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text form of the file. Invalid results are left out.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if let Some(reference) = &self.reference {
            let _ = writeln!(
                out,
                "{REFERENCE_HEADER} | {} | {}",
                reference.path.display(),
                reference.frame_number
            );
        }
        out.push_str(COLUMNS_COMMENT);
        out.push('\n');
        for (frame, r) in self.entries.iter().filter(|(_, r)| r.is_valid) {
            let local_shifts = r.local_shifts.as_ref().map(ToString::to_string).unwrap_or_default();
            let _ = write!(
                out,
                "{} | {} | {} | {} | {} | {} | {} | {} | {}",
                frame.path.display(),
                frame.frame_number,
                r.shift_x,
                r.shift_y,
                r.rotation_center_x,
                r.rotation_center_y,
                r.rotation,
                r.ranking,
                local_shifts
            );
            if r.zoom != 1.0 {
                let _ = write!(out, " | {}", r.zoom);
            }
            out.push('\n');
        }
        out
    }

    /// Write the file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_text())?;
        let skipped = self.entries.values().filter(|r| !r.is_valid).count();
        if skipped > 0 {
            warn!(skipped, "Frames without a valid alignment were not written");
        }
        info!(path = %path.display(), frames = self.len() - skipped, "Saved alignment file");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        fs::read_to_string(path)?.parse()
    }
}

impl FromStr for AlignmentFile {
    type Err = StackerError;

    fn from_str(text: &str) -> Result<Self> {
        let mut file = AlignmentFile::default();
        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields[0] == REFERENCE_HEADER {
                if fields.len() != 3 {
                    return Err(line_error(line_number, "reference line needs a path and a frame number"));
                }
                let frame_number = parse_field(fields[2], "frame_number", line_number)?;
                file.reference = Some(InputFrame::video(PathBuf::from(fields[1]), frame_number));
                continue;
            }
            if !(8..=10).contains(&fields.len()) {
                return Err(line_error(
                    line_number,
                    &format!("expected 9 or 10 '|' separated fields, found {}", fields.len()),
                ));
            }

            let frame = InputFrame::video(
                PathBuf::from(fields[0]),
                parse_field(fields[1], "frame_number", line_number)?,
            );
            let local_shifts = match fields.get(8).filter(|s| !s.is_empty()) {
                Some(s) => Some(
                    s.parse::<LocalShiftsHandler>()
                        .map_err(|e| line_error(line_number, &e.to_string()))?,
                ),
                None => None,
            };
            let result = AlignmentResult {
                shift_x: parse_field(fields[2], "shift_x", line_number)?,
                shift_y: parse_field(fields[3], "shift_y", line_number)?,
                rotation_center_x: parse_field(fields[4], "rotation_center_x", line_number)?,
                rotation_center_y: parse_field(fields[5], "rotation_center_y", line_number)?,
                rotation: parse_field(fields[6], "rotation", line_number)?,
                zoom: match fields.get(9) {
                    Some(zoom) => parse_field(zoom, "zoom", line_number)?,
                    None => 1.0,
                },
                ranking: parse_field(fields[7], "ranking", line_number)?,
                local_shifts,
                is_valid: true,
            };
            file.entries.insert(frame, result);
        }
        Ok(file)
    }
}

fn parse_field<T: FromStr>(value: &str, name: &str, line: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| line_error(line, &format!("invalid {name} '{value}'")))
}

fn line_error(line: usize, reason: &str) -> StackerError {
    StackerError::AlignmentFile {
        line,
        reason: reason.to_string(),
    }
}
