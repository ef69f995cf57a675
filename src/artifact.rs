//! Session artifact: the persisted result of one analysis run.
//!
//! On disk the artifact is a safetensors-layout file:
//!
//! ```text
//! u64 LE header length │ JSON header │ tensor bytes (little-endian)
//! ```
//!
//! Tensor keys:
//!
//! ```text
//! sfreq                                   F64 [1]
//! epochs/<timing>/<disp>/data             F64 [E, C, T]
//! epochs/<timing>/<disp>/anchors          I64 [E]
//! epochs/<timing>/<disp>/tmin             F64 [1]
//! psd/power/<timing>/<disp>               F64 [F] or [C, F]
//! psd/freqs/<timing>/<disp>               F64 [F]
//! psd/normalized_power/<disp>             F64 [F] or [C, F]
//! psd/band_power/<timing>/<disp>/<band>   F64 [C]
//! tfr/<band>/power/<timing>/<disp>        F64 [C, F, T']
//! tfr/<band>/itc/<timing>/<disp>          F64 [C, F, T']
//! tfr/<band>/freqs/<timing>/<disp>        F64 [F]
//! tfr/<band>/times/<timing>/<disp>        F64 [T']
//! ```
//!
//! Channel names, bad channels and per-group epoch channel names are JSON
//! arrays in `__metadata__`. Floats are stored as raw bits, so a write/read
//! round trip is exact, NaN included.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array1, ArrayD, Ix1, Ix3, IxDyn};
use serde::Deserialize;

use crate::config::{Disposition, Timing};
use crate::epoch::Epochs;
use crate::tfr::TfrResult;

/// `(timing, disposition)` key of an epoch group.
pub type GroupKey = (Timing, Disposition);

/// TFR results of one band, per epoch group.
pub type BandTfr = BTreeMap<GroupKey, TfrResult>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsdArtifact {
    /// Epoch-averaged power, `[F]` or `[C, F]`.
    pub power: BTreeMap<GroupKey, ArrayD<f64>>,
    pub freqs: BTreeMap<GroupKey, Array1<f64>>,
    /// Stimulus over pre-stimulus power per disposition.
    pub normalized_power: BTreeMap<Disposition, ArrayD<f64>>,
    /// Min–max normalised band power per channel; empty unless enabled.
    pub band_power: BTreeMap<GroupKey, BTreeMap<String, Array1<f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionArtifact {
    pub sfreq: f64,
    pub ch_names: Vec<String>,
    pub bads: Vec<String>,
    pub epochs: BTreeMap<GroupKey, Epochs>,
    pub psd: PsdArtifact,
    /// Band name → per-group TFR.
    pub tfr: BTreeMap<String, BandTfr>,
}

impl SessionArtifact {
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("writing artifact {}", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading artifact {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("decoding artifact {}", path.display()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = TensorWriter::new();
        w.metadata("ch_names", serde_json::to_string(&self.ch_names)?);
        w.metadata("bads", serde_json::to_string(&self.bads)?);
        w.add_f64("sfreq", &[self.sfreq], &[1]);

        for (&(t, d), ep) in &self.epochs {
            let base = format!("epochs/{t}/{d}");
            w.add_f64_nd(&format!("{base}/data"), ep.data.iter().copied(), ep.data.shape());
            let anchors: Vec<i64> = ep.anchors.iter().map(|&a| a as i64).collect();
            w.add_i64(&format!("{base}/anchors"), &anchors, &[anchors.len()]);
            w.add_f64(&format!("{base}/tmin"), &[ep.tmin], &[1]);
            w.metadata(&format!("{base}/ch_names"), serde_json::to_string(&ep.ch_names)?);
        }

        for (&(t, d), p) in &self.psd.power {
            w.add_f64_nd(&format!("psd/power/{t}/{d}"), p.iter().copied(), p.shape());
        }
        for (&(t, d), f) in &self.psd.freqs {
            w.add_f64_nd(&format!("psd/freqs/{t}/{d}"), f.iter().copied(), f.shape());
        }
        for (d, p) in &self.psd.normalized_power {
            w.add_f64_nd(&format!("psd/normalized_power/{d}"), p.iter().copied(), p.shape());
        }
        for (&(t, d), bands) in &self.psd.band_power {
            for (band, v) in bands {
                w.add_f64_nd(&format!("psd/band_power/{t}/{d}/{band}"), v.iter().copied(), v.shape());
            }
        }

        for (band, groups) in &self.tfr {
            for (&(t, d), r) in groups {
                w.add_f64_nd(&format!("tfr/{band}/power/{t}/{d}"), r.power.iter().copied(), r.power.shape());
                w.add_f64_nd(&format!("tfr/{band}/itc/{t}/{d}"), r.itc.iter().copied(), r.itc.shape());
                w.add_f64_nd(&format!("tfr/{band}/freqs/{t}/{d}"), r.freqs.iter().copied(), r.freqs.shape());
                w.add_f64_nd(&format!("tfr/{band}/times/{t}/{d}"), r.times.iter().copied(), r.times.shape());
            }
        }
        w.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file = TensorFile::parse(bytes)?;
        let mut out = SessionArtifact {
            sfreq: scalar(&file, "sfreq")?,
            ch_names: file.metadata_json("ch_names")?,
            bads: file.metadata_json("bads")?,
            ..Self::default()
        };

        for name in file.names() {
            let parts: Vec<&str> = name.split('/').collect();
            match parts.as_slice() {
                ["sfreq"] => {}
                ["epochs", t, d, "data"] => {
                    let base = format!("epochs/{t}/{d}");
                    let anchors = file
                        .i64(&format!("{base}/anchors"))?
                        .iter()
                        .map(|&a| usize::try_from(a).context("negative epoch anchor"))
                        .collect::<Result<Vec<_>>>()?;
                    let ep = Epochs {
                        data: file.f64(name)?.into_dimensionality::<Ix3>()?,
                        anchors,
                        ch_names: file.metadata_json(&format!("{base}/ch_names"))?,
                        sfreq: out.sfreq,
                        tmin: scalar(&file, &format!("{base}/tmin"))?,
                    };
                    out.epochs.insert(group_key(t, d)?, ep);
                }
                ["epochs", _, _, "anchors" | "tmin"] => {}
                ["psd", "power", t, d] => {
                    out.psd.power.insert(group_key(t, d)?, file.f64(name)?);
                }
                ["psd", "freqs", t, d] => {
                    out.psd.freqs.insert(group_key(t, d)?, file.f64(name)?.into_dimensionality::<Ix1>()?);
                }
                ["psd", "normalized_power", d] => {
                    let d = Disposition::parse(d).with_context(|| format!("unknown disposition in {name}"))?;
                    out.psd.normalized_power.insert(d, file.f64(name)?);
                }
                ["psd", "band_power", t, d, band] => {
                    out.psd
                        .band_power
                        .entry(group_key(t, d)?)
                        .or_default()
                        .insert(band.to_string(), file.f64(name)?.into_dimensionality::<Ix1>()?);
                }
                ["tfr", band, "power", t, d] => {
                    let field = |f: &str| file.f64(&format!("tfr/{band}/{f}/{t}/{d}"));
                    let r = TfrResult {
                        power: field("power")?.into_dimensionality::<Ix3>()?,
                        itc: field("itc")?.into_dimensionality::<Ix3>()?,
                        freqs: field("freqs")?.into_dimensionality::<Ix1>()?,
                        times: field("times")?.into_dimensionality::<Ix1>()?,
                    };
                    out.tfr.entry(band.to_string()).or_default().insert(group_key(t, d)?, r);
                }
                ["tfr", _, "itc" | "freqs" | "times", _, _] => {}
                _ => bail!("unexpected tensor {name:?}"),
            }
        }
        Ok(out)
    }
}

fn group_key(t: &str, d: &str) -> Result<GroupKey> {
    let timing = Timing::parse(t).with_context(|| format!("unknown timing {t:?}"))?;
    let disp = Disposition::parse(d).with_context(|| format!("unknown disposition {d:?}"))?;
    Ok((timing, disp))
}

fn scalar(file: &TensorFile<'_>, name: &str) -> Result<f64> {
    let v = file.f64(name)?;
    ensure!(v.len() == 1, "{name} should hold one value, has {}", v.len());
    v.iter().next().copied().with_context(|| format!("{name} is empty"))
}

// ── safetensors writer ───────────────────────────────────────────────────────

/// Minimal safetensors writer for `F64` and `I64` tensors plus string
/// metadata.
pub struct TensorWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for TensorWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorWriter {
    pub fn new() -> Self {
        Self { entries: Vec::new(), metadata: serde_json::Map::new() }
    }

    pub fn metadata(&mut self, key: &str, value: String) {
        self.metadata.insert(key.to_string(), serde_json::Value::String(value));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        self.add_f64_nd(name, data.iter().copied(), shape);
    }

    /// Add a tensor from its elements in row-major order.
    pub fn add_f64_nd(&mut self, name: &str, data: impl IntoIterator<Item = f64>, shape: &[usize]) {
        let bytes: Vec<u8> = data.into_iter().flat_map(f64::to_le_bytes).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header_map.insert("__metadata__".into(), serde_json::Value::Object(self.metadata.clone()));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;

        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend_from_slice(&hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }
}

// ── safetensors parser ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TensorInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// Parsed view over a safetensors buffer.
pub struct TensorFile<'a> {
    tensors: BTreeMap<String, TensorInfo>,
    metadata: BTreeMap<String, String>,
    data: &'a [u8],
}

impl<'a> TensorFile<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        ensure!(bytes.len() >= 8, "safetensors buffer too small");
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = usize::try_from(u64::from_le_bytes(len))?;
        let end = 8usize.checked_add(n).filter(|&e| e <= bytes.len());
        let end = end.context("safetensors header runs past end of buffer")?;

        let mut header: BTreeMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..end]).context("failed to parse safetensors header")?;
        let metadata = match header.remove("__metadata__") {
            Some(v) => serde_json::from_value(v).context("bad __metadata__")?,
            None => BTreeMap::new(),
        };
        let tensors = header
            .into_iter()
            .map(|(k, v)| {
                let info: TensorInfo =
                    serde_json::from_value(v).with_context(|| format!("bad header entry {k:?}"))?;
                Ok((k, info))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let data = &bytes[end..];
        for (name, info) in &tensors {
            let [s, e] = info.data_offsets;
            ensure!(s <= e && e <= data.len(), "tensor {name:?} offsets out of range");
        }
        Ok(Self { tensors, metadata, data })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    fn raw(&self, name: &str, dtype: &str) -> Result<(&TensorInfo, &'a [u8])> {
        let info = self.tensors.get(name).with_context(|| format!("missing tensor {name:?}"))?;
        ensure!(info.dtype == dtype, "tensor {name:?} is {}, expected {dtype}", info.dtype);
        let [s, e] = info.data_offsets;
        let raw = &self.data[s..e];
        let count: usize = info.shape.iter().product();
        ensure!(raw.len() == count * 8, "tensor {name:?} holds {} bytes for {count} elements", raw.len());
        Ok((info, raw))
    }

    pub fn f64(&self, name: &str) -> Result<ArrayD<f64>> {
        let (info, raw) = self.raw(name, "F64")?;
        let values: Vec<f64> = raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&info.shape), values)?)
    }

    pub fn i64(&self, name: &str) -> Result<Vec<i64>> {
        let (_, raw) = self.raw(name, "I64")?;
        Ok(raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    pub fn metadata_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        let s = self.metadata.get(key).with_context(|| format!("missing metadata {key:?}"))?;
        serde_json::from_str(s).with_context(|| format!("bad metadata {key:?}"))
    }
}
