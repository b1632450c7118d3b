//! Processed data file (PDF) header.
//!
//! The sample matrix sits at the start of the file, the header after it.
//! The last 8 bytes of the file hold the header position.

use std::io::{Read, Seek};

use super::constants::*;
use super::primitives::{checked_count, BtiReader};
use crate::error::{FormatError, Result};

/// On-disk sample type, selected by the header's `data_format` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleFormat {
    pub fn from_data_format(data_format: i16) -> std::result::Result<Self, FormatError> {
        match data_format {
            1 => Ok(SampleFormat::Int16),
            2 => Ok(SampleFormat::Int32),
            3 => Ok(SampleFormat::Float32),
            4 => Ok(SampleFormat::Float64),
            other => Err(FormatError::UnsupportedDataFormat(other)),
        }
    }

    pub fn itemsize(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int32 | SampleFormat::Float32 => 4,
            SampleFormat::Float64 => 8,
        }
    }

    /// Integer formats store counts that still need units-per-bit scaling.
    pub fn is_integer(self) -> bool {
        matches!(self, SampleFormat::Int16 | SampleFormat::Int32)
    }
}

/// Where the header lives, as derived from the file trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    /// Offset of the 8-byte trailer, i.e. file size minus 8.
    pub start: u64,
    /// Aligned offset of the header body.
    pub position: u64,
    /// `start` minus the unaligned header position.
    pub size: u64,
}

/// Resolve the header offset from the file size and the raw trailer value.
pub fn locate_header(file_size: u64, raw_trailer: i64) -> std::result::Result<HeaderLocation, FormatError> {
    if file_size < FILE_CURPOS {
        return Err(FormatError::HeaderOffset(format!(
            "file of {} bytes is too short to hold a trailer",
            file_size
        )));
    }
    let start = file_size - FILE_CURPOS;
    let check_value = raw_trailer & FILE_MASK;

    if start as i64 + FILE_CURPOS as i64 - check_value > FILE_MASK {
        return Err(FormatError::HeaderOffset(format!(
            "trailer value {} places the header too far from the end of the file",
            raw_trailer
        )));
    }

    let candidate = check_value as u64;
    let mut position = candidate;
    if position % FILE_CURPOS != 0 {
        position += FILE_CURPOS - (position % FILE_CURPOS);
    }

    if position >= start {
        return Err(FormatError::HeaderOffset(format!(
            "header offset {} lies outside the file body (trailer at {})",
            position, start
        )));
    }

    Ok(HeaderLocation {
        start,
        position,
        size: start - candidate,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Epoch {
    pub pts_in_epoch: i32,
    pub epoch_duration: f32,
    pub expected_iti: f32,
    pub actual_iti: f32,
    pub total_var_events: i32,
    pub checksum: i32,
    pub epoch_timestamp: i32,
}

impl Epoch {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let epoch = Self {
            pts_in_epoch: r.read_i32()?,
            epoch_duration: r.read_f32()?,
            expected_iti: r.read_f32()?,
            actual_iti: r.read_f32()?,
            total_var_events: r.read_i32()?,
            checksum: r.read_i32()?,
            epoch_timestamp: r.read_i32()?,
        };
        r.skip(28)?;

        Ok(epoch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfChannel {
    pub chan_label: String,
    pub chan_no: i16,
    pub attributes: i16,
    pub scale: f32,
    pub yaxis_label: String,
    pub valid_min_max: i16,
    pub ymin: f64,
    pub ymax: f64,
    pub index: i32,
    pub checksum: i32,
    pub off_flag: String,
    pub offset: f32,
}

impl PdfChannel {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let chan_label = r.read_str(16)?;
        let chan_no = r.read_i16()?;
        let attributes = r.read_i16()?;
        let scale = r.read_f32()?;
        let yaxis_label = r.read_str(16)?;
        let valid_min_max = r.read_i16()?;
        r.skip(6)?;
        let channel = Self {
            chan_label,
            chan_no,
            attributes,
            scale,
            yaxis_label,
            valid_min_max,
            ymin: r.read_f64()?,
            ymax: r.read_f64()?,
            index: r.read_i32()?,
            checksum: r.read_i32()?,
            off_flag: r.read_str(16)?,
            offset: r.read_f32()?,
        };
        r.skip(12)?;

        Ok(channel)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_name: String,
    pub start_lat: f32,
    pub end_lat: f32,
    pub step_size: f32,
    pub fixed_event: i16,
    pub checksum: i32,
}

impl Event {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let event = Self {
            event_name: r.read_str(16)?,
            start_lat: r.read_f32()?,
            end_lat: r.read_f32()?,
            step_size: r.read_f32()?,
            fixed_event: r.read_i16()?,
            checksum: r.read_i32()?,
        };
        r.skip(32)?;
        r.correct_offset()?;

        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub nbytes: i32,
    pub blocktype: String,
    pub checksum: i32,
    pub user: String,
    pub timestamp: i32,
    pub filename: String,
    pub total_steps: i32,
}

impl Process {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let process = Self {
            nbytes: r.read_i32()?,
            blocktype: r.read_str(20)?,
            checksum: r.read_i32()?,
            user: r.read_str(32)?,
            timestamp: r.read_i32()?,
            filename: r.read_str(PROCESS_FILENAME_LEN)?,
            total_steps: r.read_i32()?,
        };
        r.skip(32)?;
        r.correct_offset()?;

        Ok(process)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssocFile {
    pub file_id: i16,
    pub length: i16,
    pub checksum: i32,
}

impl AssocFile {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let file_id = r.read_i16()?;
        let length = r.read_i16()?;
        r.skip(32)?;

        Ok(Self {
            file_id,
            length,
            checksum: r.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdClass {
    pub comment_size: i32,
    pub name: String,
    pub pdf_number: i16,
    pub total_events: i32,
    pub timestamp: i32,
    pub flags: i32,
    pub de_process: i32,
    pub checksum: i32,
    pub ed_id: i32,
    pub win_width: f32,
    pub win_offset: f32,
}

impl EdClass {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let comment_size = r.read_i32()?;
        let name = r.read_str(17)?;
        r.skip(9)?;
        let ed = Self {
            comment_size,
            name,
            pdf_number: r.read_i16()?,
            total_events: r.read_i32()?,
            timestamp: r.read_i32()?,
            flags: r.read_i32()?,
            de_process: r.read_i32()?,
            checksum: r.read_i32()?,
            ed_id: r.read_i32()?,
            win_width: r.read_f32()?,
            win_offset: r.read_f32()?,
        };
        r.skip(8)?;

        Ok(ed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: i16,
    pub file_type: String,
    pub location: HeaderLocation,
    pub data_format: i16,
    pub acq_mode: i16,
    pub total_epochs: i32,
    pub input_epochs: i32,
    pub total_events: i32,
    pub total_fixed_events: i32,
    pub sample_period: f32,
    pub xaxis_label: String,
    pub total_processes: i32,
    pub total_chans: i16,
    pub checksum: i32,
    pub total_ed_classes: i32,
    pub total_associated_files: i16,
    pub last_file_index: i16,
    pub timestamp: i32,

    pub epochs: Vec<Epoch>,
    /// Channel records in file order, which is also the column order of the samples.
    pub channels: Vec<PdfChannel>,
    pub events: Vec<Event>,
    pub processes: Vec<Process>,
    pub assoc_files: Vec<AssocFile>,
    pub ed_classes: Vec<EdClass>,
    /// Bytes between the last sub-record and the trailer.
    pub extra_data: Vec<u8>,

    pub total_slices: usize,
    pub format: SampleFormat,
    pub bytes_per_slice: usize,
}

impl PdfHeader {
    pub fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let file_size = r.len();
        if file_size < FILE_CURPOS {
            return Err(FormatError::HeaderOffset(format!(
                "file of {} bytes is too short to hold a trailer",
                file_size
            ))
            .into());
        }
        r.seek_to((file_size as i64 + FILE_END) as u64)?;
        let raw_trailer = r.read_i64()?;
        let location = locate_header(file_size, raw_trailer)?;
        log::debug!(
            "PDF header at {} ({} bytes before trailer)",
            location.position,
            location.size
        );

        r.seek_to(location.position)?;
        let version = r.read_i16()?;
        let file_type = r.read_str(5)?;
        r.skip(1)?;
        let data_format = r.read_i16()?;
        let acq_mode = r.read_i16()?;
        let total_epochs = r.read_i32()?;
        let input_epochs = r.read_i32()?;
        let total_events = r.read_i32()?;
        let total_fixed_events = r.read_i32()?;
        let sample_period = r.read_f32()?;
        let xaxis_label = r.read_str(16)?;
        let total_processes = r.read_i32()?;
        let total_chans = r.read_i16()?;
        r.skip(2)?;
        let checksum = r.read_i32()?;
        let total_ed_classes = r.read_i32()?;
        let total_associated_files = r.read_i16()?;
        let last_file_index = r.read_i16()?;
        let timestamp = r.read_i32()?;
        r.skip(20)?;
        r.correct_offset()?;

        let format = SampleFormat::from_data_format(data_format)?;

        let epochs = (0..checked_count(total_epochs.into(), "epochs")?)
            .map(|_| Epoch::read(r))
            .collect::<Result<Vec<_>>>()?;
        let channels = (0..checked_count(total_chans.into(), "channels")?)
            .map(|_| PdfChannel::read(r))
            .collect::<Result<Vec<_>>>()?;
        let events = (0..checked_count(total_events.into(), "events")?)
            .map(|_| Event::read(r))
            .collect::<Result<Vec<_>>>()?;
        let processes = (0..checked_count(total_processes.into(), "processes")?)
            .map(|_| Process::read(r))
            .collect::<Result<Vec<_>>>()?;
        let assoc_files = (0..checked_count(total_associated_files.into(), "associated files")?)
            .map(|_| AssocFile::read(r))
            .collect::<Result<Vec<_>>>()?;
        let ed_classes = (0..checked_count(total_ed_classes.into(), "ed classes")?)
            .map(|_| EdClass::read(r))
            .collect::<Result<Vec<_>>>()?;

        let extra = location.start.saturating_sub(r.position()) as usize;
        let extra_data = r.read_bytes(extra)?;

        let mut total_slices = 0usize;
        for epoch in &epochs {
            total_slices += checked_count(epoch.pts_in_epoch.into(), "points in epoch")?;
        }
        let bytes_per_slice = format.itemsize() * channels.len();

        Ok(Self {
            version,
            file_type,
            location,
            data_format,
            acq_mode,
            total_epochs,
            input_epochs,
            total_events,
            total_fixed_events,
            sample_period,
            xaxis_label,
            total_processes,
            total_chans,
            checksum,
            total_ed_classes,
            total_associated_files,
            last_file_index,
            timestamp,
            epochs,
            channels,
            events,
            processes,
            assoc_files,
            ed_classes,
            extra_data,
            total_slices,
            format,
            bytes_per_slice,
        })
    }

    pub fn sfreq(&self) -> std::result::Result<f64, FormatError> {
        if !(self.sample_period > 0.0) {
            return Err(FormatError::InvalidSamplePeriod(self.sample_period));
        }

        Ok(1.0 / self.sample_period as f64)
    }

    /// Measurement date, taken from the first processing step.
    pub fn meas_date(&self) -> Option<i32> {
        self.processes.first().map(|p| p.timestamp)
    }

    /// Offset of the sample data, the matrix starts the file.
    pub fn data_offset(&self) -> u64 {
        0
    }

    /// End of the sample data, where the unaligned header begins.
    pub fn data_end(&self) -> u64 {
        self.location.start.saturating_sub(self.location.size)
    }

    /// Whole slices that fit between the data offset and the header.
    pub fn data_slices(&self) -> u64 {
        (self.data_end() - self.data_offset())
            .checked_div(self.bytes_per_slice as u64)
            .unwrap_or(0)
    }
}
