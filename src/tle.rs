//! # TLE モジュール
//!
//! 2行軌道要素（Two-Line Element）を構造的に解析・検証します。
//!
//! 軌道伝搬は行いません。ここで扱うのは各カラムの切り出し、チェックサム検証、
//! エポックの日時変換、平均運動から導かれる周期・軌道長半径のみです。
//!
//! ## カラム配置（1始まり）
//!
//! 1行目: 行番号(1) 衛星番号(3-7) 分類(8) 国際識別符号(10-17) エポック(19-32)
//!        平均運動一次微分(34-43) 二次微分(45-52) B*(54-61) 要素番号(65-68) チェックサム(69)
//!
//! 2行目: 行番号(1) 衛星番号(3-7) 軌道傾斜角(9-16) 昇交点赤経(18-25) 離心率(27-33)
//!        近地点引数(35-42) 平均近点角(44-51) 平均運動(53-63) 周回番号(64-68) チェックサム(69)

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// TLE 1行の長さ
pub const TLE_LINE_LEN: usize = 69;

/// 地球重力定数 μ (km^3/s^2)
const EARTH_MU_KM3_S2: f64 = 398_600.4418;

/// TLE 解析エラー
#[derive(Debug, Error, PartialEq)]
pub enum TleError {
    #[error("TLE {line}行目の長さが不正です: {len}文字 (期待値 {TLE_LINE_LEN})")]
    Length { line: u8, len: usize },
    #[error("TLE {line}行目の行番号が不正です: '{found}'")]
    LineNumber { line: u8, found: char },
    #[error("TLE {line}行目のチェックサムが一致しません: 計算値 {computed}, 記載値 {stated}")]
    Checksum { line: u8, computed: u32, stated: char },
    #[error("TLE 1行目と2行目の衛星番号が一致しません: {first} / {second}")]
    CatalogMismatch { first: u32, second: u32 },
    #[error("TLE {line}行目のフィールド '{field}' を解析できません: '{raw}'")]
    Field {
        line: u8,
        field: &'static str,
        raw: String,
    },
}

/// 解析済みの軌道要素
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitalElements {
    pub catalog_number: u32,
    pub classification: char,
    pub international_designator: String,
    pub epoch: NaiveDateTime,
    /// 平均運動の一次微分 / 2 (rev/day^2)
    pub mean_motion_dot: f64,
    /// B* 抗力項 (1/地球半径)
    pub bstar: f64,
    pub element_set_number: u32,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    /// 平均運動 (rev/day)
    pub mean_motion_rev_per_day: f64,
    pub revolution_number: u32,
}

impl OrbitalElements {
    /// 2行の TLE を解析
    pub fn parse(line1: &str, line2: &str) -> Result<Self, TleError> {
        let l1 = check_line(line1, 1)?;
        let l2 = check_line(line2, 2)?;

        let catalog_number = parse_u32(l1, 1, 2, 7, "catalog_number")?;
        let second_catalog = parse_u32(l2, 2, 2, 7, "catalog_number")?;
        if catalog_number != second_catalog {
            return Err(TleError::CatalogMismatch {
                first: catalog_number,
                second: second_catalog,
            });
        }

        let epoch_year = parse_u32(l1, 1, 18, 20, "epoch_year")?;
        let epoch_day = parse_f64(l1, 1, 20, 32, "epoch_day")?;
        let epoch = epoch_to_datetime(epoch_year, epoch_day).ok_or_else(|| TleError::Field {
            line: 1,
            field: "epoch",
            raw: l1[18..32].to_string(),
        })?;

        let eccentricity_raw = l2[26..33].trim();
        let eccentricity = format!("0.{}", eccentricity_raw)
            .parse::<f64>()
            .map_err(|_| TleError::Field {
                line: 2,
                field: "eccentricity",
                raw: eccentricity_raw.to_string(),
            })?;

        Ok(Self {
            catalog_number,
            classification: l1.as_bytes()[7] as char,
            international_designator: l1[9..17].trim().to_string(),
            epoch,
            mean_motion_dot: parse_f64(l1, 1, 33, 43, "mean_motion_dot")?,
            bstar: parse_implied_exponent(l1, 1, 53, 61, "bstar")?,
            element_set_number: parse_u32(l1, 1, 64, 68, "element_set_number")?,
            inclination_deg: parse_f64(l2, 2, 8, 16, "inclination")?,
            raan_deg: parse_f64(l2, 2, 17, 25, "raan")?,
            eccentricity,
            arg_perigee_deg: parse_f64(l2, 2, 34, 42, "arg_perigee")?,
            mean_anomaly_deg: parse_f64(l2, 2, 43, 51, "mean_anomaly")?,
            mean_motion_rev_per_day: parse_f64(l2, 2, 52, 63, "mean_motion")?,
            revolution_number: parse_u32(l2, 2, 63, 68, "revolution_number")?,
        })
    }

    /// 軌道周期（分）
    pub fn period_minutes(&self) -> f64 {
        1440.0 / self.mean_motion_rev_per_day
    }

    /// ケプラーの第三法則による軌道長半径（km）
    pub fn semi_major_axis_km(&self) -> f64 {
        let n_rad_s = self.mean_motion_rev_per_day * 2.0 * std::f64::consts::PI / 86_400.0;
        (EARTH_MU_KM3_S2 / (n_rad_s * n_rad_s)).cbrt()
    }
}

/// 行の長さ・行番号・チェックサムを検証し、末尾空白を除いた行を返す
fn check_line(line: &str, line_no: u8) -> Result<&str, TleError> {
    let line = line.trim_end();
    if line.len() != TLE_LINE_LEN || !line.is_ascii() {
        return Err(TleError::Length {
            line: line_no,
            len: line.chars().count(),
        });
    }

    let first = line.as_bytes()[0] as char;
    if first.to_digit(10) != Some(line_no as u32) {
        return Err(TleError::LineNumber {
            line: line_no,
            found: first,
        });
    }

    let stated = line.as_bytes()[TLE_LINE_LEN - 1] as char;
    let computed = checksum(&line[..TLE_LINE_LEN - 1]);
    if stated.to_digit(10) != Some(computed) {
        return Err(TleError::Checksum {
            line: line_no,
            computed,
            stated,
        });
    }

    Ok(line)
}

/// 数字は値、'-' は1として合計した mod 10
pub fn checksum(body: &str) -> u32 {
    body.chars()
        .map(|c| match c {
            '-' => 1,
            _ => c.to_digit(10).unwrap_or(0),
        })
        .sum::<u32>()
        % 10
}

fn parse_u32(line: &str, line_no: u8, from: usize, to: usize, field: &'static str) -> Result<u32, TleError> {
    let raw = line[from..to].trim();
    raw.parse::<u32>().map_err(|_| TleError::Field {
        line: line_no,
        field,
        raw: raw.to_string(),
    })
}

fn parse_f64(line: &str, line_no: u8, from: usize, to: usize, field: &'static str) -> Result<f64, TleError> {
    let raw = line[from..to].trim();
    // ".00032099" や "-.00002182" の形式も f64 としてそのまま解析できる
    raw.parse::<f64>().map_err(|_| TleError::Field {
        line: line_no,
        field,
        raw: raw.to_string(),
    })
}

/// " 13424-2" → 0.13424e-2 のような小数点・指数省略形式を解析
fn parse_implied_exponent(
    line: &str,
    line_no: u8,
    from: usize,
    to: usize,
    field: &'static str,
) -> Result<f64, TleError> {
    let raw = line[from..to].trim();
    let err = || TleError::Field {
        line: line_no,
        field,
        raw: raw.to_string(),
    };

    let (sign, body) = match raw.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if body.len() < 2 {
        return Err(err());
    }

    let (mantissa, exponent) = body.split_at(body.len() - 2);
    let mantissa = format!("0.{}", mantissa).parse::<f64>().map_err(|_| err())?;
    let exponent = exponent.parse::<i32>().map_err(|_| err())?;
    Ok(sign * mantissa * 10f64.powi(exponent))
}

/// 2桁年と通日（小数）から日時を求める。57未満は2000年代
fn epoch_to_datetime(two_digit_year: u32, day_of_year: f64) -> Option<NaiveDateTime> {
    let year = if two_digit_year < 57 {
        2000 + two_digit_year as i32
    } else {
        1900 + two_digit_year as i32
    };
    let days_in_year = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() { 366.0 } else { 365.0 };
    if !(1.0..days_in_year + 1.0).contains(&day_of_year) {
        return None;
    }
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let offset_us = ((day_of_year - 1.0) * 86_400.0 * 1_000_000.0).round() as i64;
    Some(jan1 + Duration::microseconds(offset_us))
}
