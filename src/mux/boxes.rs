// ISO-BMFF 박스 writer - 메모리 버퍼에 기록, 박스 크기는 end()에서 패치

use crate::error::{EncodeError, Result};

/// 박스 단위 big-endian writer
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: Vec<u8>,
    /// 열려 있는 박스 시작 위치
    open: Vec<usize>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), open: Vec::new() }
    }

    /// 박스 시작 (크기는 임시 0)
    pub fn start(&mut self, box_type: &[u8; 4]) {
        self.open.push(self.buf.len());
        self.u32(0);
        self.bytes(box_type);
    }

    /// full box 시작 (version + 24bit flags)
    pub fn start_full(&mut self, box_type: &[u8; 4], version: u8, flags: u32) {
        self.start(box_type);
        self.u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
    }

    /// 마지막으로 연 박스 닫기 → 크기 패치
    pub fn end(&mut self) -> Result<()> {
        let start = self
            .open
            .pop()
            .ok_or_else(|| EncodeError::MuxingFailure("unbalanced box end".to_string()))?;
        let size = self.buf.len() - start;
        let size = u32::try_from(size)
            .map_err(|_| EncodeError::MuxingFailure(format!("box too large: {} bytes", size)))?;
        self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
        Ok(())
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// 단위 행렬 (mvhd/tkhd)
    pub fn unity_matrix(&mut self) {
        for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
            self.u32(v);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 완성된 버퍼 반환 (열린 박스가 남아 있으면 에러)
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.open.is_empty() {
            return Err(EncodeError::MuxingFailure(format!(
                "{} boxes left open",
                self.open.len()
            )));
        }
        Ok(self.buf)
    }
}

/// MPEG-4 descriptor 길이 (7bit 가변 길이)
pub fn descriptor_length(len: usize) -> Vec<u8> {
    let mut groups = vec![(len & 0x7F) as u8];
    let mut rest = len >> 7;
    while rest > 0 {
        groups.push(((rest & 0x7F) as u8) | 0x80);
        rest >>= 7;
    }
    groups.reverse();
    groups
}
