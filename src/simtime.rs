//! # SimTime モジュール
//!
//! シナリオの `simtime` セクション（開始時刻・終了時刻・時間刻み）から
//! 固定刻みのシミュレーション時計を構築します。
//!
//! 各ステップの時刻は `start + step * delta` として毎回計算し、
//! 加算の積み重ねによる誤差が生じないようにしています。

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

/// シナリオファイルで使用する時刻フォーマット
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 時刻設定のエラー
#[derive(Debug, Error, PartialEq)]
pub enum SimTimeError {
    #[error("時刻が空です: {0}")]
    Empty(&'static str),
    #[error("時刻の解析に失敗しました '{value}': {reason}")]
    Parse { value: String, reason: String },
    #[error("時間刻みは正の値である必要があります: {0}")]
    NonPositiveDelta(f64),
    #[error("終了時刻 {end} が開始時刻 {start} 以前です")]
    EndBeforeStart { start: String, end: String },
    #[error("シミュレーション区間 {window_s}秒 に時間刻み {delta_s}秒 のステップが1つも入りません")]
    NoSteps { window_s: f64, delta_s: f64 },
}

/// 文字列を `YYYY-MM-DD HH:MM:SS` 形式として解析
pub fn parse_time(value: &str) -> Result<NaiveDateTime, SimTimeError> {
    NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT).map_err(|e| SimTimeError::Parse {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// 時刻を `YYYY-MM-DD HH:MM:SS` 形式で整形
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// 秒数（小数可）を chrono の Duration に変換（マイクロ秒精度）
pub fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::microseconds((seconds * 1_000_000.0).round() as i64)
}

/// 固定刻みのシミュレーション時計
#[derive(Debug, Clone, PartialEq)]
pub struct SimClock {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// 時間刻み（秒）
    pub delta_s: f64,
    /// 実行するステップ数
    pub num_steps: u64,
}

impl SimClock {
    /// 開始・終了時刻文字列と時間刻みから時計を作成
    pub fn new(start: &str, end: &str, delta_s: f64) -> Result<Self, SimTimeError> {
        if start.trim().is_empty() {
            return Err(SimTimeError::Empty("starttime"));
        }
        if end.trim().is_empty() {
            return Err(SimTimeError::Empty("endtime"));
        }
        if !(delta_s > 0.0) || !delta_s.is_finite() {
            return Err(SimTimeError::NonPositiveDelta(delta_s));
        }

        let start_time = parse_time(start)?;
        let end_time = parse_time(end)?;
        if end_time <= start_time {
            return Err(SimTimeError::EndBeforeStart {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let window_s = (end_time - start_time).num_milliseconds() as f64 / 1000.0;
        let num_steps = (window_s / delta_s).floor() as u64;
        if num_steps == 0 {
            return Err(SimTimeError::NoSteps { window_s, delta_s });
        }

        Ok(Self {
            start: start_time,
            end: end_time,
            delta_s,
            num_steps,
        })
    }

    /// 指定ステップの時刻
    pub fn time_at(&self, step: u64) -> NaiveDateTime {
        self.start + seconds_to_duration(step as f64 * self.delta_s)
    }

    /// シミュレーション区間の長さ（秒）
    pub fn window_s(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}
