// Builders for synthetic 4D files, written field by field in on-disk order.

use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use nalgebra::{Matrix4, Vector3};

use crate::read::bti::config::UserBlockData;
use crate::read::bti::constants::*;

pub fn put_str(buf: &mut Vec<u8>, s: &str, len: usize) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(len, 0);
    buf.extend_from_slice(&bytes);
}

pub fn pad(buf: &mut Vec<u8>, n: usize) {
    buf.extend(std::iter::repeat(0u8).take(n));
}

pub fn align(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

pub fn put_transform(buf: &mut Vec<u8>, t: &Matrix4<f64>) {
    for i in 0..4 {
        for j in 0..4 {
            buf.write_f64::<BigEndian>(t[(i, j)]).unwrap();
        }
    }
}

pub fn put_vec3(buf: &mut Vec<u8>, v: &Vector3<f64>) {
    for x in v.iter() {
        buf.write_f64::<BigEndian>(*x).unwrap();
    }
}

pub fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    let mut t = Matrix4::identity();
    t[(0, 3)] = x;
    t[(1, 3)] = y;
    t[(2, 3)] = z;
    t
}

pub fn config_header(total_chans: i16, total_sensors: i16, total_user_blocks: i16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_i16::<BigEndian>(1).unwrap();
    put_str(&mut buf, "Test site", 32);
    put_str(&mut buf, "dap01", 16);
    buf.write_i16::<BigEndian>(2).unwrap();
    buf.write_i32::<BigEndian>(0).unwrap();
    buf.write_i16::<BigEndian>(50).unwrap();
    buf.write_i16::<BigEndian>(total_chans).unwrap();
    buf.write_f32::<BigEndian>(1.0).unwrap();
    buf.write_f32::<BigEndian>(2.5e-7).unwrap();
    buf.write_i16::<BigEndian>(total_sensors).unwrap();
    buf.write_i16::<BigEndian>(total_user_blocks).unwrap();
    buf.write_i16::<BigEndian>(0).unwrap();
    pad(&mut buf, 2);
    buf.write_u32::<BigEndian>(0xBEEF).unwrap();
    pad(&mut buf, 32);
    buf
}

pub fn user_block(kind: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_i32::<BigEndian>(payload.len() as i32 + 104).unwrap();
    put_str(&mut buf, kind, 20);
    buf.write_i32::<BigEndian>(0).unwrap();
    put_str(&mut buf, "tester", 32);
    buf.write_i32::<BigEndian>(1_000_000).unwrap();
    buf.write_i32::<BigEndian>(payload.len() as i32).unwrap();
    pad(&mut buf, 32);
    align(&mut buf);
    buf.extend_from_slice(payload);
    align(&mut buf);
    buf
}

/// Payload bytes for the block kinds the tests exercise.
pub fn encode_block(data: &UserBlockData) -> Vec<u8> {
    let mut buf = Vec::new();
    match data {
        UserBlockData::ChanMapVersion(v) | UserBlockData::SubsysVersion(v) => {
            buf.write_i16::<BigEndian>(v.version).unwrap();
            buf.write_i16::<BigEndian>(v.struct_size).unwrap();
            buf.write_i16::<BigEndian>(v.entries).unwrap();
            pad(&mut buf, 8);
        }
        UserBlockData::ChanMap(entries) => {
            for e in entries {
                for v in [e.subsys_type, e.subsys_num, e.card_num, e.chan_num, e.recdspnum] {
                    buf.write_i16::<BigEndian>(v).unwrap();
                }
                pad(&mut buf, 8);
            }
        }
        UserBlockData::Subsys(entries) => {
            for e in entries {
                for v in [
                    e.subsys_type,
                    e.subsys_num,
                    e.cards_per_sys,
                    e.channels_per_card,
                    e.card_version,
                ] {
                    buf.write_i16::<BigEndian>(v).unwrap();
                }
                pad(&mut buf, 2);
                buf.write_f32::<BigEndian>(e.offsetdacgain).unwrap();
                buf.write_i32::<BigEndian>(e.squid_type).unwrap();
                buf.write_i16::<BigEndian>(e.timesliceoffset).unwrap();
                buf.write_i16::<BigEndian>(e.padding).unwrap();
                buf.write_f32::<BigEndian>(e.volts_per_bit).unwrap();
            }
        }
        UserBlockData::ChannelLabels(labels) => {
            buf.write_i32::<BigEndian>(labels.version).unwrap();
            buf.write_i32::<BigEndian>(labels.labels.len() as i32).unwrap();
            pad(&mut buf, 16);
            for label in &labels.labels {
                put_str(&mut buf, label, 16);
            }
        }
        UserBlockData::Calibration(cal) => {
            buf.write_i16::<BigEndian>(cal.sensor_no).unwrap();
            pad(&mut buf, 2);
            buf.write_i32::<BigEndian>(cal.timestamp).unwrap();
            put_str(&mut buf, &cal.logdir, 256);
        }
        UserBlockData::SysConfigTime(t) => {
            put_str(&mut buf, &t.sysconfig_name, 512);
            buf.write_i32::<BigEndian>(t.timestamp).unwrap();
        }
        UserBlockData::DeltaEnabled(v) => {
            buf.write_i16::<BigEndian>(*v).unwrap();
        }
        UserBlockData::CcpTransform(ccp) => {
            buf.write_i32::<BigEndian>(ccp.method).unwrap();
            pad(&mut buf, 4);
            put_transform(&mut buf, &ccp.transform);
        }
        UserBlockData::TrigMask(mask) => {
            buf.write_i32::<BigEndian>(mask.version).unwrap();
            buf.write_i32::<BigEndian>(mask.masks.len() as i32).unwrap();
            pad(&mut buf, 16);
            for m in &mask.masks {
                put_str(&mut buf, &m.name, 20);
                buf.write_u16::<BigEndian>(m.nbits).unwrap();
                buf.write_u16::<BigEndian>(m.shift).unwrap();
                buf.write_u32::<BigEndian>(m.mask).unwrap();
                pad(&mut buf, 8);
            }
        }
        UserBlockData::ETable(table) => {
            let h = &table.header;
            buf.write_i32::<BigEndian>(h.version).unwrap();
            buf.write_i32::<BigEndian>(h.entry_size).unwrap();
            buf.write_i32::<BigEndian>(h.n_entries).unwrap();
            put_str(&mut buf, &h.filtername, 16);
            buf.write_i32::<BigEndian>(h.n_e_values).unwrap();
            pad(&mut buf, 28);
            if h.version == 2 {
                for name in table.ch_names.iter().chain(&table.e_ch_names) {
                    put_str(&mut buf, name, 16);
                }
            }
            for v in table.etable.iter() {
                buf.write_f32::<BigEndian>(*v).unwrap();
            }
        }
        UserBlockData::WeightTable(table) => {
            let h = &table.header;
            buf.write_i32::<BigEndian>(h.version).unwrap();
            buf.write_i32::<BigEndian>(h.entry_size).unwrap();
            buf.write_i32::<BigEndian>(h.n_entries).unwrap();
            put_str(&mut buf, &h.name, 32);
            put_str(&mut buf, &h.description, 80);
            buf.write_i32::<BigEndian>(h.n_anlg).unwrap();
            buf.write_i32::<BigEndian>(h.n_dsp).unwrap();
            pad(&mut buf, 72);
            if h.version == 2 {
                for name in table.ch_names.iter().chain(&table.anlg_ch_names).chain(&table.dsp_ch_names) {
                    put_str(&mut buf, name, 16);
                }
                for v in table.dsp_wts.iter() {
                    buf.write_f32::<BigEndian>(*v).unwrap();
                }
                for v in table.anlg_wts.iter() {
                    buf.write_i16::<BigEndian>(*v).unwrap();
                }
            } else {
                for (anlg, dsp) in table.anlg_wts.rows().into_iter().zip(table.dsp_wts.rows()) {
                    for v in anlg.iter() {
                        buf.write_i16::<BigEndian>(*v).unwrap();
                    }
                    buf.write_i16::<BigEndian>(0).unwrap();
                    for v in dsp.iter() {
                        buf.write_f32::<BigEndian>(*v).unwrap();
                    }
                }
            }
        }
        UserBlockData::Unknown(bytes) => buf.extend_from_slice(bytes),
        other => panic!("no test encoder for {:?}", other),
    }
    buf
}

pub struct ChannelLayout {
    pub name: &'static str,
    pub chan_no: i16,
    pub ch_type: u16,
    pub gain: f32,
    pub units_per_bit: f32,
    pub transform: Matrix4<f64>,
}

impl ChannelLayout {
    pub fn new(name: &'static str, chan_no: i16, ch_type: u16) -> Self {
        Self {
            name,
            chan_no,
            ch_type,
            gain: 1.0,
            units_per_bit: 1.0,
            transform: Matrix4::identity(),
        }
    }

    pub fn calibrated(mut self, gain: f32, units_per_bit: f32) -> Self {
        self.gain = gain;
        self.units_per_bit = units_per_bit;
        self
    }

    pub fn at(mut self, transform: Matrix4<f64>) -> Self {
        self.transform = transform;
        self
    }
}

fn device_header(buf: &mut Vec<u8>) {
    buf.write_i32::<BigEndian>(0).unwrap();
    buf.write_i32::<BigEndian>(0).unwrap();
    pad(buf, 32);
}

pub fn channel_record(layout: &ChannelLayout) -> Vec<u8> {
    let mut buf = Vec::new();
    put_str(&mut buf, layout.name, 16);
    buf.write_i16::<BigEndian>(layout.chan_no).unwrap();
    buf.write_u16::<BigEndian>(layout.ch_type).unwrap();
    buf.write_i16::<BigEndian>(layout.chan_no).unwrap();
    pad(&mut buf, 2);
    buf.write_f32::<BigEndian>(layout.gain).unwrap();
    buf.write_f32::<BigEndian>(layout.units_per_bit).unwrap();
    put_str(&mut buf, "T", 16);
    buf.write_f64::<BigEndian>(0.0).unwrap();
    buf.write_i32::<BigEndian>(0).unwrap();
    pad(&mut buf, 32);
    align(&mut buf);

    match layout.ch_type {
        CHTYPE_MEG | CHTYPE_REFERENCE => {
            device_header(&mut buf);
            buf.write_f32::<BigEndian>(0.5).unwrap();
            pad(&mut buf, 4);
            put_transform(&mut buf, &layout.transform);
            buf.write_i16::<BigEndian>(1).unwrap();
            buf.write_i16::<BigEndian>(1).unwrap();
            pad(&mut buf, 4 + 32);
            put_vec3(&mut buf, &Vector3::new(0.0, 0.0, 0.0));
            put_vec3(&mut buf, &Vector3::new(0.0, 0.0, 1.0));
            buf.write_f64::<BigEndian>(0.009).unwrap();
            buf.write_f64::<BigEndian>(0.0001).unwrap();
            buf.write_i16::<BigEndian>(1).unwrap();
            pad(&mut buf, 2);
            buf.write_i32::<BigEndian>(0).unwrap();
            pad(&mut buf, 32);
        }
        CHTYPE_EEG => {
            device_header(&mut buf);
            buf.write_f32::<BigEndian>(5.0).unwrap();
            pad(&mut buf, 4);
            put_transform(&mut buf, &layout.transform);
            pad(&mut buf, 32);
        }
        CHTYPE_TRIGGER => {
            device_header(&mut buf);
            buf.write_i32::<BigEndian>(0).unwrap();
            pad(&mut buf, 2 + 32);
        }
        CHTYPE_EXTERNAL | CHTYPE_UTILITY | CHTYPE_DERIVED => {
            device_header(&mut buf);
            buf.write_i32::<BigEndian>(0).unwrap();
            pad(&mut buf, 32);
        }
        CHTYPE_SHORTED => {
            device_header(&mut buf);
            pad(&mut buf, 32);
        }
        _ => {}
    }
    align(&mut buf);
    buf
}

pub fn config_file(transforms: &[Matrix4<f64>], blocks: &[(&str, Vec<u8>)], channels: &[ChannelLayout]) -> Vec<u8> {
    let mut buf = config_header(channels.len() as i16, transforms.len() as i16, blocks.len() as i16);
    for t in transforms {
        put_transform(&mut buf, t);
    }
    for (kind, payload) in blocks {
        buf.extend(user_block(kind, payload));
    }
    for ch in channels {
        buf.extend(channel_record(ch));
    }
    buf
}

pub struct PdfLayout {
    pub data_format: i16,
    pub sample_period: f32,
    /// (label, channel number, scale) in file order
    pub channels: Vec<(&'static str, i16, f32)>,
    pub epochs: Vec<i32>,
    pub samples: Vec<u8>,
    pub n_events: usize,
    pub process_timestamps: Vec<i32>,
    pub n_assoc_files: usize,
    pub n_ed_classes: usize,
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self {
            data_format: 1,
            sample_period: 0.0009765625,
            channels: Vec::new(),
            epochs: Vec::new(),
            samples: Vec::new(),
            n_events: 0,
            process_timestamps: Vec::new(),
            n_assoc_files: 0,
            n_ed_classes: 0,
        }
    }
}

pub fn pdf_file(layout: &PdfLayout) -> Vec<u8> {
    let mut buf = layout.samples.clone();
    align(&mut buf);
    let header_pos = buf.len();

    buf.write_i16::<BigEndian>(1).unwrap();
    put_str(&mut buf, "pdf", 5);
    pad(&mut buf, 1);
    buf.write_i16::<BigEndian>(layout.data_format).unwrap();
    buf.write_i16::<BigEndian>(1).unwrap();
    buf.write_i32::<BigEndian>(layout.epochs.len() as i32).unwrap();
    buf.write_i32::<BigEndian>(layout.epochs.len() as i32).unwrap();
    buf.write_i32::<BigEndian>(layout.n_events as i32).unwrap();
    buf.write_i32::<BigEndian>(0).unwrap();
    buf.write_f32::<BigEndian>(layout.sample_period).unwrap();
    put_str(&mut buf, "sec", 16);
    buf.write_i32::<BigEndian>(layout.process_timestamps.len() as i32).unwrap();
    buf.write_i16::<BigEndian>(layout.channels.len() as i16).unwrap();
    pad(&mut buf, 2);
    buf.write_i32::<BigEndian>(0).unwrap();
    buf.write_i32::<BigEndian>(layout.n_ed_classes as i32).unwrap();
    buf.write_i16::<BigEndian>(layout.n_assoc_files as i16).unwrap();
    buf.write_i16::<BigEndian>(0).unwrap();
    buf.write_i32::<BigEndian>(1_234_567).unwrap();
    pad(&mut buf, 20);
    align(&mut buf);

    for pts in &layout.epochs {
        buf.write_i32::<BigEndian>(*pts).unwrap();
        buf.write_f32::<BigEndian>(*pts as f32 * layout.sample_period).unwrap();
        buf.write_f32::<BigEndian>(0.0).unwrap();
        buf.write_f32::<BigEndian>(0.0).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        pad(&mut buf, 28);
    }

    for (index, (label, chan_no, scale)) in layout.channels.iter().enumerate() {
        put_str(&mut buf, label, 16);
        buf.write_i16::<BigEndian>(*chan_no).unwrap();
        buf.write_i16::<BigEndian>(0).unwrap();
        buf.write_f32::<BigEndian>(*scale).unwrap();
        put_str(&mut buf, "T", 16);
        buf.write_i16::<BigEndian>(0).unwrap();
        pad(&mut buf, 6);
        buf.write_f64::<BigEndian>(-1.0).unwrap();
        buf.write_f64::<BigEndian>(1.0).unwrap();
        buf.write_i32::<BigEndian>(index as i32).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        put_str(&mut buf, "off", 16);
        buf.write_f32::<BigEndian>(0.0).unwrap();
        pad(&mut buf, 12);
    }

    for i in 0..layout.n_events {
        put_str(&mut buf, &format!("event{}", i), 16);
        buf.write_f32::<BigEndian>(-0.1).unwrap();
        buf.write_f32::<BigEndian>(0.5).unwrap();
        buf.write_f32::<BigEndian>(0.001).unwrap();
        buf.write_i16::<BigEndian>(1).unwrap();
        buf.write_i32::<BigEndian>(0).unwrap();
        pad(&mut buf, 32);
        align(&mut buf);
    }

    for ts in &layout.process_timestamps {
        buf.write_i32::<BigEndian>(360).unwrap();
        put_str(&mut buf, "PDF_Process", 20);
        buf.write_i32::<BigEndian>(0).unwrap();
        put_str(&mut buf, "tester", 32);
        buf.write_i32::<BigEndian>(*ts).unwrap();
        put_str(&mut buf, "c,rfDC", 256);
        buf.write_i32::<BigEndian>(1).unwrap();
        pad(&mut buf, 32);
        align(&mut buf);
    }

    for i in 0..layout.n_assoc_files {
        buf.write_i16::<BigEndian>(i as i16 + 1).unwrap();
        buf.write_i16::<BigEndian>(64).unwrap();
        pad(&mut buf, 32);
        buf.write_i32::<BigEndian>(0).unwrap();
    }

    for i in 0..layout.n_ed_classes {
        buf.write_i32::<BigEndian>(0).unwrap();
        put_str(&mut buf, &format!("class{}", i), 17);
        pad(&mut buf, 9);
        buf.write_i16::<BigEndian>(1).unwrap();
        buf.write_i32::<BigEndian>(3).unwrap();
        for _ in 0..5 {
            buf.write_i32::<BigEndian>(0).unwrap();
        }
        buf.write_f32::<BigEndian>(0.5).unwrap();
        buf.write_f32::<BigEndian>(-0.1).unwrap();
        pad(&mut buf, 8);
    }

    buf.write_i64::<BigEndian>(header_pos as i64).unwrap();
    buf
}

pub fn be_i16(values: &[i16]) -> Vec<u8> {
    let mut buf = Vec::new();
    for v in values {
        buf.write_i16::<BigEndian>(*v).unwrap();
    }
    buf
}

pub fn be_f64(values: &[f64]) -> Vec<u8> {
    let mut buf = Vec::new();
    for v in values {
        buf.write_f64::<BigEndian>(*v).unwrap();
    }
    buf
}

pub fn head_shape_file(idx_points: &[[f64; 3]; 5], dig_points: &[[f64; 3]]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_i32::<BigEndian>(1).unwrap();
    buf.write_i32::<BigEndian>(1_234_567).unwrap();
    buf.write_i32::<BigEndian>(0).unwrap();
    buf.write_i32::<BigEndian>(dig_points.len() as i32).unwrap();
    for p in idx_points.iter().chain(dig_points) {
        for x in p {
            buf.write_f64::<BigEndian>(*x).unwrap();
        }
    }
    buf
}

// Left, right, nasion, then two HPI coils, in 4D head coordinates (x to the nose, y to the left)
pub const IDX_POINTS: [[f64; 3]; 5] = [
    [0.0, 0.07, 0.0],
    [0.0, -0.07, 0.0],
    [0.1, 0.0, 0.0],
    [0.05, 0.05, 0.05],
    [0.05, -0.05, 0.05],
];

pub const DIG_POINTS: [[f64; 3]; 2] = [[0.02, 0.0, 0.09], [-0.06, 0.0, 0.08]];

pub const SESSION_SLICES: usize = 5;

/// Config channels in config order. `UACurrent` is not recorded in the PDF.
pub fn session_channels() -> Vec<ChannelLayout> {
    vec![
        ChannelLayout::new("A2", 1, CHTYPE_MEG)
            .calibrated(2.0, 4.0)
            .at(translation(0.0, 0.0, 0.05)),
        ChannelLayout::new("A1", 2, CHTYPE_MEG)
            .calibrated(1.0, 2.0)
            .at(translation(0.01, 0.02, 0.03)),
        ChannelLayout::new("TRIGGER", 3, CHTYPE_TRIGGER),
        ChannelLayout::new("MxA", 4, CHTYPE_REFERENCE).at(translation(0.0, 0.0, 0.2)),
        ChannelLayout::new("UACurrent", 9, CHTYPE_UTILITY),
    ]
}

/// Raw sample at `slice` for the PDF column `column`.
pub fn session_sample(slice: usize, column: usize) -> i16 {
    (10 * (column + 1) + slice) as i16
}

pub fn session_pdf() -> PdfLayout {
    let mut samples = Vec::new();
    for s in 0..SESSION_SLICES {
        for c in 0..4 {
            samples.push(session_sample(s, c));
        }
    }

    PdfLayout {
        channels: vec![("TRIGGER", 3, 1.0), ("A2", 1, 1.0), ("A1", 2, 3.0), ("MxA", 4, 1.0)],
        epochs: vec![SESSION_SLICES as i32],
        samples: be_i16(&samples),
        process_timestamps: vec![1_300_000_000],
        ..PdfLayout::default()
    }
}

pub fn session_config(channels: &[ChannelLayout]) -> Vec<u8> {
    use crate::read::bti::config::{ETable, ETableHeader};

    let e_table = UserBlockData::ETable(ETable {
        header: ETableHeader {
            version: 2,
            entry_size: 4,
            n_entries: 1,
            filtername: "0.1,200".to_string(),
            n_e_values: 1,
        },
        ch_names: vec!["A1".to_string()],
        e_ch_names: vec!["MxA".to_string()],
        etable: ndarray::array![[0.25f32]],
    });

    config_file(
        &[Matrix4::identity()],
        &[(UB_B_E_TABLE_USED, encode_block(&e_table))],
        channels,
    )
}

/// Write a complete recording into `dir`: `c,rfDC`, `config` and `hs_file`.
pub fn write_session(dir: &Path, with_head_shape: bool) {
    std::fs::write(dir.join("c,rfDC"), pdf_file(&session_pdf())).unwrap();
    std::fs::write(dir.join(DEFAULT_CONFIG_NAME), session_config(&session_channels())).unwrap();
    if with_head_shape {
        std::fs::write(
            dir.join(DEFAULT_HEAD_SHAPE_NAME),
            head_shape_file(&IDX_POINTS, &DIG_POINTS),
        )
        .unwrap();
    }
}
