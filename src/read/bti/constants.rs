// 4D Neuroimaging / BTi on-disk constants

// File layout
pub const FILE_MASK: i64 = 2147483647;
pub const FILE_CURPOS: u64 = 8;
pub const FILE_END: i64 = -8;

pub const FILE_HS_VERSION: u64 = 0;
pub const FILE_HS_N_DIGPOINTS: u64 = 12;

// Fixed sizes of string and reserved fields
pub const CH_NAME_LEN: usize = 16;
pub const CH_RESERVED_LEN: usize = 32;
pub const UB_KIND_LEN: usize = 20;
pub const UB_USERNAME_LEN: usize = 32;
pub const PROCESS_FILENAME_LEN: usize = 256;

// General data constants
pub const DATA_N_IDX_POINTS: usize = 5;
pub const DATA_N_COH_POINTS: usize = 16;
pub const DATA_N_MAG_INFO_HEADERS: usize = 6;
pub const FIFF_LOGNO: i32 = 111;

// Channel types
pub const CHTYPE_MEG: u16 = 1;
pub const CHTYPE_EEG: u16 = 2;
pub const CHTYPE_REFERENCE: u16 = 3;
pub const CHTYPE_EXTERNAL: u16 = 4;
pub const CHTYPE_TRIGGER: u16 = 5;
pub const CHTYPE_UTILITY: u16 = 6;
pub const CHTYPE_DERIVED: u16 = 7;
pub const CHTYPE_SHORTED: u16 = 8;

// User block kind tags
pub const UB_B_MAG_INFO: &str = "B_Mag_Info";
pub const UB_B_COH_POINTS: &str = "B_COH_Points";
pub const UB_B_CCP_XFM_BLOCK: &str = "b_ccp_xfm_block";
pub const UB_B_EEG_LOCS: &str = "b_eeg_elec_locs";
pub const UB_B_WHC_CHAN_MAP_VER: &str = "B_WHChanMapVer";
pub const UB_B_WHC_CHAN_MAP: &str = "B_WHChanMap";
pub const UB_B_WHS_SUBSYS_VER: &str = "B_WHSubsysVer";
pub const UB_B_WHS_SUBSYS: &str = "B_WHSubsys";
pub const UB_B_CH_LABELS: &str = "B_ch_labels";
pub const UB_B_CALIBRATION: &str = "B_Calibration";
pub const UB_B_SYS_CONFIG_TIME: &str = "B_SysConfigTime";
pub const UB_B_DELTA_ENABLED: &str = "B_DELTA_ENABLED";
pub const UB_B_E_TABLE_USED: &str = "B_E_table_used";
pub const UB_B_E_TABLE: &str = "B_E_TABLE";
pub const UB_B_WEIGHTS_USED: &str = "B_weights_used";
pub const UB_B_TRIG_MASK: &str = "B_trig_mask";
// Prefix, weight tables are stored as `BWT_<name>`
pub const UB_B_WEIGHT_TABLE: &str = "BWT_";

// Magnes 2500 reference channels, used by the legacy table layouts
pub const WH2500_REF_MAG: [&str; 6] = ["MxA", "MyA", "MzA", "MxaA", "MyaA", "MzaA"];
pub const WH2500_REF_GRAD: [&str; 5] = ["GxxA", "GyyA", "GyxA", "GzaA", "GzyA"];
pub const WH2500_NAME: &str = "WH2500";

// Raw sample scaling for MEG and reference channels
pub const MEG_UNIT_SCALE: f64 = 1e-15;

// Default passband when the E-table carries no usable filter name
pub const DEFAULT_HIGHPASS: f64 = 0.0;
pub const DEFAULT_LOWPASS: f64 = 300.0;

// Operator correction applied on top of the fiducial alignment
pub const DEFAULT_ROTATION_X: f64 = 2.0;
pub const DEFAULT_TRANSLATION: [f64; 3] = [0.0, 0.02, 0.11];

// Default file names written by the acquisition software
pub const DEFAULT_CONFIG_NAME: &str = "config";
pub const DEFAULT_HEAD_SHAPE_NAME: &str = "hs_file";

pub fn data_format_name(data_format: i16) -> &'static str {
    match data_format {
        1 => "int16",
        2 => "int32",
        3 => "float32",
        4 => "float64",
        _ => "unknown",
    }
}

pub fn channel_type_name(ch_type: u16) -> &'static str {
    match ch_type {
        CHTYPE_MEG => "MEG",
        CHTYPE_EEG => "EEG",
        CHTYPE_REFERENCE => "REFERENCE",
        CHTYPE_EXTERNAL => "EXTERNAL",
        CHTYPE_TRIGGER => "TRIGGER",
        CHTYPE_UTILITY => "UTILITY",
        CHTYPE_DERIVED => "DERIVED",
        CHTYPE_SHORTED => "SHORTED",
        _ => "UNKNOWN",
    }
}
