//! System config file decoder.
//!
//! The config file is a fixed header, one 4x4 transform per sensor, a run of
//! self-describing user blocks and finally one record per acquisition channel.
//! User blocks are decoded in file order. Table blocks (`B_WHChanMap`,
//! `B_WHSubsys`) do not carry their own length: it is declared by a version
//! block earlier in the file, collected in [`DeclaredCounts`] as the pass goes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use nalgebra::{Matrix4, Vector3};
use ndarray::Array2;

use super::constants::*;
use super::primitives::{checked_count, BtiReader};
use crate::error::{FormatError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigHeader {
    pub version: i16,
    pub site_name: String,
    pub dap_hostname: String,
    pub sys_type: i16,
    pub sys_options: i32,
    pub supply_freq: i16,
    pub total_chans: i16,
    pub system_fixed_gain: f32,
    pub volts_per_bit: f32,
    pub total_sensors: i16,
    pub total_user_blocks: i16,
    pub next_der_chan_no: i16,
    pub checksum: u32,
}

impl ConfigHeader {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let version = r.read_i16()?;
        let site_name = r.read_str(32)?;
        let dap_hostname = r.read_str(16)?;
        let sys_type = r.read_i16()?;
        let sys_options = r.read_i32()?;
        let supply_freq = r.read_i16()?;
        let total_chans = r.read_i16()?;
        let system_fixed_gain = r.read_f32()?;
        let volts_per_bit = r.read_f32()?;
        let total_sensors = r.read_i16()?;
        let total_user_blocks = r.read_i16()?;
        let next_der_chan_no = r.read_i16()?;
        r.skip(2)?;
        let checksum = r.read_u32()?;
        r.skip(32)?;

        Ok(Self {
            version,
            site_name,
            dap_hostname,
            sys_type,
            sys_options,
            supply_freq,
            total_chans,
            system_fixed_gain,
            volts_per_bit,
            total_sensors,
            total_user_blocks,
            next_der_chan_no,
            checksum,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserBlockHeader {
    pub nbytes: i32,
    pub kind: String,
    pub checksum: i32,
    pub username: String,
    pub timestamp: i32,
    pub user_space_size: i32,
}

impl UserBlockHeader {
    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let header = Self {
            nbytes: r.read_i32()?,
            kind: r.read_str(UB_KIND_LEN)?,
            checksum: r.read_i32()?,
            username: r.read_str(UB_USERNAME_LEN)?,
            timestamp: r.read_i32()?,
            user_space_size: r.read_i32()?,
        };
        r.skip(32)?;
        r.correct_offset()?;

        Ok(header)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserBlock {
    pub header: UserBlockHeader,
    pub data: UserBlockData,
}

/// Decoded payload of a user block, one variant per kind tag.
#[derive(Debug, Clone, PartialEq)]
pub enum UserBlockData {
    MagInfo(MagInfo),
    CohPoints(CohPoints),
    CcpTransform(CcpTransform),
    EegLocations(Vec<EegElectrode>),
    ChanMapVersion(TableVersion),
    ChanMap(Vec<ChanMapEntry>),
    SubsysVersion(TableVersion),
    Subsys(Vec<SubsysEntry>),
    ChannelLabels(ChannelLabels),
    Calibration(CalibrationInfo),
    SysConfigTime(SysConfigTime),
    DeltaEnabled(i16),
    ETable(ETable),
    WeightTable(WeightTable),
    TrigMask(TrigMask),
    /// Kind tag this reader does not know, kept as the raw user space.
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MagInfoHeader {
    pub name: String,
    pub transform: Matrix4<f64>,
    pub units_per_bit: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MagInfo {
    pub version: i32,
    pub headers: Vec<MagInfoHeader>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohPoint {
    pub pos: Vector3<f64>,
    pub direction: Vector3<f64>,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohPoints {
    pub n_points: i32,
    pub status: i32,
    pub points: Vec<CohPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CcpTransform {
    pub method: i32,
    pub transform: Matrix4<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EegElectrode {
    pub label: String,
    pub location: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableVersion {
    pub version: i16,
    pub struct_size: i16,
    pub entries: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChanMapEntry {
    pub subsys_type: i16,
    pub subsys_num: i16,
    pub card_num: i16,
    pub chan_num: i16,
    pub recdspnum: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsysEntry {
    pub subsys_type: i16,
    pub subsys_num: i16,
    pub cards_per_sys: i16,
    pub channels_per_card: i16,
    pub card_version: i16,
    pub offsetdacgain: f32,
    pub squid_type: i32,
    pub timesliceoffset: i16,
    pub padding: i16,
    pub volts_per_bit: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLabels {
    pub version: i32,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationInfo {
    pub sensor_no: i16,
    pub timestamp: i32,
    pub logdir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SysConfigTime {
    pub sysconfig_name: String,
    pub timestamp: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ETableHeader {
    pub version: i32,
    pub entry_size: i32,
    pub n_entries: i32,
    pub filtername: String,
    pub n_e_values: i32,
}

/// Reference correction table. Rows are channels, columns reference sensors.
#[derive(Debug, Clone, PartialEq)]
pub struct ETable {
    pub header: ETableHeader,
    pub ch_names: Vec<String>,
    pub e_ch_names: Vec<String>,
    pub etable: Array2<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightTableHeader {
    pub version: i32,
    pub entry_size: i32,
    pub n_entries: i32,
    pub name: String,
    pub description: String,
    pub n_anlg: i32,
    pub n_dsp: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    pub header: WeightTableHeader,
    pub ch_names: Vec<String>,
    pub anlg_ch_names: Vec<String>,
    pub dsp_ch_names: Vec<String>,
    pub dsp_wts: Array2<f32>,
    pub anlg_wts: Array2<i16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrigMaskEntry {
    pub name: String,
    pub nbits: u16,
    pub shift: u16,
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrigMask {
    pub version: i32,
    pub masks: Vec<TrigMaskEntry>,
}

/// Entry counts declared by version blocks seen so far in the pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredCounts {
    chan_map: Option<usize>,
    subsys: Option<usize>,
}

impl DeclaredCounts {
    fn record(&mut self, data: &UserBlockData) -> std::result::Result<(), FormatError> {
        match data {
            UserBlockData::ChanMapVersion(v) => {
                self.chan_map = Some(checked_count(v.entries.into(), UB_B_WHC_CHAN_MAP_VER)?);
            }
            UserBlockData::SubsysVersion(v) => {
                self.subsys = Some(checked_count(v.entries.into(), UB_B_WHS_SUBSYS_VER)?);
            }
            _ => {}
        }

        Ok(())
    }

    fn require(
        declared: Option<usize>,
        block: &str,
        dependency: &'static str,
    ) -> std::result::Result<usize, FormatError> {
        declared.ok_or_else(|| FormatError::MissingDependency {
            block: block.to_string(),
            dependency,
        })
    }
}

fn read_strings<R: Read + Seek>(r: &mut BtiReader<R>, n: usize, len: usize) -> Result<Vec<String>> {
    (0..n).map(|_| r.read_str(len)).collect()
}

fn read_table_version<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<TableVersion> {
    let v = TableVersion {
        version: r.read_i16()?,
        struct_size: r.read_i16()?,
        entries: r.read_i16()?,
    };
    r.skip(8)?;

    Ok(v)
}

fn read_mag_info<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<MagInfo> {
    let version = r.read_i32()?;
    r.skip(20)?;

    let mut headers = Vec::with_capacity(DATA_N_MAG_INFO_HEADERS);
    for _ in 0..DATA_N_MAG_INFO_HEADERS {
        headers.push(MagInfoHeader {
            name: r.read_str(16)?,
            transform: r.read_transform()?,
            units_per_bit: r.read_f32()?,
        });
        r.skip(20)?;
    }

    Ok(MagInfo { version, headers })
}

fn read_coh_points<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<CohPoints> {
    let n_points = r.read_i32()?;
    let status = r.read_i32()?;

    let mut points = Vec::with_capacity(DATA_N_COH_POINTS);
    for _ in 0..DATA_N_COH_POINTS {
        points.push(CohPoint {
            pos: r.read_vec3()?,
            direction: r.read_vec3()?,
            error: r.read_f64()?,
        });
    }

    Ok(CohPoints {
        n_points,
        status,
        points,
    })
}

fn read_eeg_locations<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Vec<EegElectrode>> {
    let mut electrodes = Vec::new();
    loop {
        let label = r.read_str(16)?;
        let location = r.read_vec3()?;
        if label.is_empty() {
            break;
        }
        electrodes.push(EegElectrode { label, location });
    }

    Ok(electrodes)
}

fn read_chan_map<R: Read + Seek>(r: &mut BtiReader<R>, n: usize) -> Result<Vec<ChanMapEntry>> {
    r.require_records(n, 18)?;
    let mut channels = Vec::with_capacity(n);
    for _ in 0..n {
        channels.push(ChanMapEntry {
            subsys_type: r.read_i16()?,
            subsys_num: r.read_i16()?,
            card_num: r.read_i16()?,
            chan_num: r.read_i16()?,
            recdspnum: r.read_i16()?,
        });
        r.skip(8)?;
    }

    Ok(channels)
}

fn read_subsys<R: Read + Seek>(r: &mut BtiReader<R>, n: usize) -> Result<Vec<SubsysEntry>> {
    r.require_records(n, 28)?;
    let mut subsys = Vec::with_capacity(n);
    for _ in 0..n {
        let subsys_type = r.read_i16()?;
        let subsys_num = r.read_i16()?;
        let cards_per_sys = r.read_i16()?;
        let channels_per_card = r.read_i16()?;
        let card_version = r.read_i16()?;
        r.skip(2)?;

        subsys.push(SubsysEntry {
            subsys_type,
            subsys_num,
            cards_per_sys,
            channels_per_card,
            card_version,
            offsetdacgain: r.read_f32()?,
            squid_type: r.read_i32()?,
            timesliceoffset: r.read_i16()?,
            padding: r.read_i16()?,
            volts_per_bit: r.read_f32()?,
        });
    }

    Ok(subsys)
}

fn read_channel_labels<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<ChannelLabels> {
    let version = r.read_i32()?;
    let entries = checked_count(r.read_i32()?.into(), UB_B_CH_LABELS)?;
    r.skip(16)?;

    Ok(ChannelLabels {
        version,
        labels: read_strings(r, entries, 16)?,
    })
}

fn read_e_table<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<ETable> {
    let mut header = ETableHeader {
        version: r.read_i32()?,
        entry_size: r.read_i32()?,
        n_entries: r.read_i32()?,
        filtername: r.read_str(16)?,
        n_e_values: r.read_i32()?,
    };
    r.skip(28)?;

    let rows = checked_count(header.n_entries.into(), "E-table entries")?;
    if header.version == 2 {
        let cols = checked_count(header.n_e_values.into(), "E-table values")?;
        let ch_names = read_strings(r, rows, 16)?;
        let e_ch_names = read_strings(r, cols, 16)?;
        let etable = r.read_f32_matrix(rows, cols)?;

        Ok(ETable {
            header,
            ch_names,
            e_ch_names,
            etable,
        })
    } else {
        // Magnes 2500: fixed reference magnetometer columns, no names on disk
        header.n_e_values = WH2500_REF_MAG.len() as i32;
        let etable = r.read_f32_matrix(rows, WH2500_REF_MAG.len())?;
        r.correct_offset()?;

        Ok(ETable {
            header,
            ch_names: vec![WH2500_NAME.to_string(); rows],
            e_ch_names: WH2500_REF_MAG.iter().map(|s| s.to_string()).collect(),
            etable,
        })
    }
}

fn read_weight_table<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<WeightTable> {
    let mut header = WeightTableHeader {
        version: r.read_i32()?,
        entry_size: r.read_i32()?,
        n_entries: r.read_i32()?,
        name: r.read_str(32)?,
        description: r.read_str(80)?,
        n_anlg: r.read_i32()?,
        n_dsp: r.read_i32()?,
    };
    r.skip(72)?;

    let rows = checked_count(header.n_entries.into(), "weight table entries")?;
    if header.version == 2 {
        let n_anlg = checked_count(header.n_anlg.into(), "analog weights")?;
        let n_dsp = checked_count(header.n_dsp.into(), "digital weights")?;
        let ch_names = read_strings(r, rows, 16)?;
        let anlg_ch_names = read_strings(r, n_anlg, 16)?;
        let dsp_ch_names = read_strings(r, n_dsp, 16)?;
        let dsp_wts = r.read_f32_matrix(rows, n_dsp)?;
        let anlg_wts = r.read_i16_matrix(rows, n_anlg)?;

        Ok(WeightTable {
            header,
            ch_names,
            anlg_ch_names,
            dsp_ch_names,
            dsp_wts,
            anlg_wts,
        })
    } else {
        // Magnes 2500: per row, analog weights, one pad short, digital weights
        let anlg_ch_names: Vec<String> = WH2500_REF_MAG[..3].iter().map(|s| s.to_string()).collect();
        let dsp_ch_names: Vec<String> = WH2500_REF_GRAD.iter().map(|s| s.to_string()).collect();
        header.n_anlg = anlg_ch_names.len() as i32;
        header.n_dsp = dsp_ch_names.len() as i32;
        let row_size = 2 * (anlg_ch_names.len() as u64 + 1) + 4 * dsp_ch_names.len() as u64;
        r.require_records(rows, row_size)?;

        let mut anlg_wts = Array2::<i16>::zeros((rows, anlg_ch_names.len()));
        let mut dsp_wts = Array2::<f32>::zeros((rows, dsp_ch_names.len()));
        for n in 0..rows {
            let anlg = r.read_i16_matrix(1, anlg_ch_names.len())?;
            anlg_wts.row_mut(n).assign(&anlg.row(0));
            r.read_i16()?;
            let dsp = r.read_f32_matrix(1, dsp_ch_names.len())?;
            dsp_wts.row_mut(n).assign(&dsp.row(0));
        }
        r.correct_offset()?;

        Ok(WeightTable {
            header,
            ch_names: vec![WH2500_NAME.to_string(); rows],
            anlg_ch_names,
            dsp_ch_names,
            dsp_wts,
            anlg_wts,
        })
    }
}

fn read_trig_mask<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<TrigMask> {
    let version = r.read_i32()?;
    let entries = checked_count(r.read_i32()?.into(), UB_B_TRIG_MASK)?;
    r.skip(16)?;
    r.require_records(entries, 36)?;

    let mut masks = Vec::with_capacity(entries);
    for _ in 0..entries {
        masks.push(TrigMaskEntry {
            name: r.read_str(20)?,
            nbits: r.read_u16()?,
            shift: r.read_u16()?,
            mask: r.read_u32()?,
        });
        r.skip(8)?;
    }

    Ok(TrigMask { version, masks })
}

fn read_user_block_data<R: Read + Seek>(
    r: &mut BtiReader<R>,
    header: &UserBlockHeader,
    counts: &DeclaredCounts,
) -> Result<UserBlockData> {
    let kind = header.kind.as_str();
    let data = match kind {
        UB_B_MAG_INFO => UserBlockData::MagInfo(read_mag_info(r)?),
        UB_B_COH_POINTS => UserBlockData::CohPoints(read_coh_points(r)?),
        UB_B_CCP_XFM_BLOCK => {
            let method = r.read_i32()?;
            r.skip(4)?;
            UserBlockData::CcpTransform(CcpTransform {
                method,
                transform: r.read_transform()?,
            })
        }
        UB_B_EEG_LOCS => UserBlockData::EegLocations(read_eeg_locations(r)?),
        UB_B_WHC_CHAN_MAP_VER => UserBlockData::ChanMapVersion(read_table_version(r)?),
        UB_B_WHS_SUBSYS_VER => UserBlockData::SubsysVersion(read_table_version(r)?),
        UB_B_WHC_CHAN_MAP => {
            let n = DeclaredCounts::require(counts.chan_map, kind, UB_B_WHC_CHAN_MAP_VER)?;
            UserBlockData::ChanMap(read_chan_map(r, n)?)
        }
        UB_B_WHS_SUBSYS => {
            let n = DeclaredCounts::require(counts.subsys, kind, UB_B_WHS_SUBSYS_VER)?;
            UserBlockData::Subsys(read_subsys(r, n)?)
        }
        UB_B_CH_LABELS => UserBlockData::ChannelLabels(read_channel_labels(r)?),
        UB_B_CALIBRATION => {
            let sensor_no = r.read_i16()?;
            r.skip(2)?;
            UserBlockData::Calibration(CalibrationInfo {
                sensor_no,
                timestamp: r.read_i32()?,
                logdir: r.read_str(256)?,
            })
        }
        UB_B_SYS_CONFIG_TIME => UserBlockData::SysConfigTime(SysConfigTime {
            sysconfig_name: r.read_str(512)?,
            timestamp: r.read_i32()?,
        }),
        UB_B_DELTA_ENABLED => UserBlockData::DeltaEnabled(r.read_i16()?),
        UB_B_E_TABLE_USED | UB_B_E_TABLE => UserBlockData::ETable(read_e_table(r)?),
        _ if kind == UB_B_WEIGHTS_USED || kind.starts_with(UB_B_WEIGHT_TABLE) => {
            UserBlockData::WeightTable(read_weight_table(r)?)
        }
        UB_B_TRIG_MASK => UserBlockData::TrigMask(read_trig_mask(r)?),
        _ => {
            log::debug!(
                "Unknown user block `{}`, keeping {} opaque bytes",
                kind,
                header.user_space_size
            );
            let n = checked_count(header.user_space_size.into(), "user space size")?;
            UserBlockData::Unknown(r.read_bytes(n)?)
        }
    };

    Ok(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Meg,
    Eeg,
    Reference,
    External,
    Trigger,
    Utility,
    Derived,
    Shorted,
    Unknown(u16),
}

impl From<u16> for ChannelType {
    fn from(value: u16) -> Self {
        match value {
            CHTYPE_MEG => ChannelType::Meg,
            CHTYPE_EEG => ChannelType::Eeg,
            CHTYPE_REFERENCE => ChannelType::Reference,
            CHTYPE_EXTERNAL => ChannelType::External,
            CHTYPE_TRIGGER => ChannelType::Trigger,
            CHTYPE_UTILITY => ChannelType::Utility,
            CHTYPE_DERIVED => ChannelType::Derived,
            CHTYPE_SHORTED => ChannelType::Shorted,
            other => ChannelType::Unknown(other),
        }
    }
}

impl ChannelType {
    pub fn code(self) -> u16 {
        match self {
            ChannelType::Meg => CHTYPE_MEG,
            ChannelType::Eeg => CHTYPE_EEG,
            ChannelType::Reference => CHTYPE_REFERENCE,
            ChannelType::External => CHTYPE_EXTERNAL,
            ChannelType::Trigger => CHTYPE_TRIGGER,
            ChannelType::Utility => CHTYPE_UTILITY,
            ChannelType::Derived => CHTYPE_DERIVED,
            ChannelType::Shorted => CHTYPE_SHORTED,
            ChannelType::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHeader {
    pub size: i32,
    pub checksum: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoilLoop {
    pub position: Vector3<f64>,
    pub orientation: Vector3<f64>,
    pub radius: f64,
    pub wire_radius: f64,
    pub turns: i16,
    pub checksum: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MegDevice {
    pub inductance: f32,
    pub transform: Matrix4<f64>,
    pub xform_flag: i16,
    pub loops: Vec<CoilLoop>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EegDevice {
    pub impedance: f32,
    pub transform: Matrix4<f64>,
}

/// Type-specific part of a channel record.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    /// MEG and reference channels
    Meg(MegDevice),
    Eeg(EegDevice),
    External { user_space_size: i32 },
    Trigger { user_space_size: i32 },
    /// Utility and derived channels
    Utility { user_space_size: i32 },
    Shorted,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub name: String,
    pub chan_no: i16,
    pub ch_type: ChannelType,
    pub sensor_no: i16,
    pub gain: f32,
    pub units_per_bit: f32,
    pub yaxis_label: String,
    pub aar_val: f64,
    pub checksum: i32,
    pub device: Option<DeviceHeader>,
    pub payload: ChannelPayload,
}

impl ChannelConfig {
    /// Coil transform in 4D device coordinates, MEG and reference channels only.
    pub fn transform(&self) -> Option<&Matrix4<f64>> {
        match &self.payload {
            ChannelPayload::Meg(dev) => Some(&dev.transform),
            _ => None,
        }
    }

    fn read<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<Self> {
        let name = r.read_str(CH_NAME_LEN)?;
        let chan_no = r.read_i16()?;
        let ch_type = ChannelType::from(r.read_u16()?);
        let sensor_no = r.read_i16()?;
        r.skip(2)?;
        let gain = r.read_f32()?;
        let units_per_bit = r.read_f32()?;
        let yaxis_label = r.read_str(16)?;
        let aar_val = r.read_f64()?;
        let checksum = r.read_i32()?;
        r.skip(CH_RESERVED_LEN as i64)?;
        r.correct_offset()?;

        let (device, payload) = match ch_type {
            ChannelType::Meg | ChannelType::Reference => {
                let device = read_device_header(r)?;
                let inductance = r.read_f32()?;
                r.skip(4)?;
                let transform = r.read_transform()?;
                let xform_flag = r.read_i16()?;
                let total_loops = checked_count(r.read_i16()?.into(), "coil loops")?;
                r.skip(4)?;
                r.skip(CH_RESERVED_LEN as i64)?;

                r.require_records(total_loops, 104)?;
                let mut loops = Vec::with_capacity(total_loops);
                for _ in 0..total_loops {
                    loops.push(read_coil_loop(r)?);
                }

                let dev = MegDevice {
                    inductance,
                    transform,
                    xform_flag,
                    loops,
                };
                (Some(device), ChannelPayload::Meg(dev))
            }
            ChannelType::Eeg => {
                let device = read_device_header(r)?;
                let impedance = r.read_f32()?;
                r.skip(4)?;
                let transform = r.read_transform()?;
                r.skip(CH_RESERVED_LEN as i64)?;
                (
                    Some(device),
                    ChannelPayload::Eeg(EegDevice {
                        impedance,
                        transform,
                    }),
                )
            }
            ChannelType::External => {
                let device = read_device_header(r)?;
                let user_space_size = r.read_i32()?;
                r.skip(CH_RESERVED_LEN as i64)?;
                (Some(device), ChannelPayload::External { user_space_size })
            }
            ChannelType::Trigger => {
                let device = read_device_header(r)?;
                let user_space_size = r.read_i32()?;
                r.skip(2)?;
                r.skip(CH_RESERVED_LEN as i64)?;
                (Some(device), ChannelPayload::Trigger { user_space_size })
            }
            ChannelType::Utility | ChannelType::Derived => {
                let device = read_device_header(r)?;
                let user_space_size = r.read_i32()?;
                r.skip(CH_RESERVED_LEN as i64)?;
                (Some(device), ChannelPayload::Utility { user_space_size })
            }
            ChannelType::Shorted => {
                let device = read_device_header(r)?;
                r.skip(CH_RESERVED_LEN as i64)?;
                (Some(device), ChannelPayload::Shorted)
            }
            ChannelType::Unknown(code) => {
                log::warn!("Channel `{}` has unknown type {}, no device record read", name, code);
                (None, ChannelPayload::Unknown)
            }
        };
        r.correct_offset()?;
        log::debug!("Read channel `{}` ({})", name, channel_type_name(ch_type.code()));

        Ok(Self {
            name,
            chan_no,
            ch_type,
            sensor_no,
            gain,
            units_per_bit,
            yaxis_label,
            aar_val,
            checksum,
            device,
            payload,
        })
    }
}

fn read_device_header<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<DeviceHeader> {
    let header = DeviceHeader {
        size: r.read_i32()?,
        checksum: r.read_i32()?,
    };
    r.skip(32)?;

    Ok(header)
}

fn read_coil_loop<R: Read + Seek>(r: &mut BtiReader<R>) -> Result<CoilLoop> {
    let position = r.read_vec3()?;
    let orientation = r.read_vec3()?;
    let radius = r.read_f64()?;
    let wire_radius = r.read_f64()?;
    let turns = r.read_i16()?;
    r.skip(2)?;
    let checksum = r.read_i32()?;
    r.skip(32)?;

    Ok(CoilLoop {
        position,
        orientation,
        radius,
        wire_radius,
        turns,
        checksum,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub header: ConfigHeader,
    /// One transform per sensor; the first one places the sensor array.
    pub transforms: Vec<Matrix4<f64>>,
    pub user_blocks: BTreeMap<String, UserBlock>,
    pub channels: Vec<ChannelConfig>,
}

impl SystemConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Reading 4D config file {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut r = BtiReader::new(reader)?;

        let header = ConfigHeader::read(&mut r)?;

        let total_sensors = checked_count(header.total_sensors.into(), "total sensors")?;
        let mut transforms = Vec::with_capacity(total_sensors);
        for _ in 0..total_sensors {
            transforms.push(r.read_transform()?);
        }

        let total_user_blocks = checked_count(header.total_user_blocks.into(), "total user blocks")?;
        let mut user_blocks = BTreeMap::new();
        let mut counts = DeclaredCounts::default();
        for index in 0..total_user_blocks {
            let block_header = UserBlockHeader::read(&mut r)?;
            if block_header.kind.is_empty() {
                return Err(FormatError::EmptyBlockKind { index }.into());
            }

            let data = read_user_block_data(&mut r, &block_header, &counts)?;
            counts.record(&data)?;
            r.correct_offset()?;

            log::debug!("Read user block `{}`", block_header.kind);
            user_blocks.insert(
                block_header.kind.clone(),
                UserBlock {
                    header: block_header,
                    data,
                },
            );
        }

        let total_chans = checked_count(header.total_chans.into(), "total channels")?;
        let mut channels = Vec::with_capacity(total_chans);
        for _ in 0..total_chans {
            channels.push(ChannelConfig::read(&mut r)?);
        }

        Ok(Self {
            header,
            transforms,
            user_blocks,
            channels,
        })
    }

    pub fn block(&self, kind: &str) -> Option<&UserBlockData> {
        self.user_blocks.get(kind).map(|b| &b.data)
    }

    /// The E-table applied during acquisition, if recorded.
    pub fn e_table_used(&self) -> Option<&ETable> {
        match self.block(UB_B_E_TABLE_USED) {
            Some(UserBlockData::ETable(table)) => Some(table),
            _ => None,
        }
    }

    pub fn weights_used(&self) -> Option<&WeightTable> {
        match self.block(UB_B_WEIGHTS_USED) {
            Some(UserBlockData::WeightTable(table)) => Some(table),
            _ => None,
        }
    }
}
