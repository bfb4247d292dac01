/// Command records exchanged between the producer and the workers
///
/// A `Command` is plain `Copy` data: an opcode plus two integer operands,
/// two handle operands and a small inline payload for push constants.
/// Log slots are overwritten in place, nothing is allocated per command.

use crate::backend::{BufferId, PipelineId};
use crate::error::{Error, Result};
use crate::layout::StageFlags;
use crate::scheduler::draw_bindings::DrawBindingsId;

/// Largest push-constant update carried inline by one command
pub const MAX_INLINE_PAYLOAD: usize = 64;

/// Command opcode
///
/// `None` marks an empty log slot and is never executed.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    None = 0,
    Draw = 1,
    DrawIndexed = 2,
    BufferUpload = 3,
    BeginRecording = 4,
    EndRecording = 5,
    Shutdown = 6,
    PushConstants = 7,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            0 => OpCode::None,
            1 => OpCode::Draw,
            2 => OpCode::DrawIndexed,
            3 => OpCode::BufferUpload,
            4 => OpCode::BeginRecording,
            5 => OpCode::EndRecording,
            6 => OpCode::Shutdown,
            7 => OpCode::PushConstants,
            _ => return None,
        };
        Some(op)
    }
}

/// One command log record
///
/// Operand meaning per opcode:
///
/// | opcode           | int0            | int1         | handle0        | handle1 |
/// |------------------|-----------------|--------------|----------------|---------|
/// | `Draw`           | vertex count    | first vertex | draw bindings  |         |
/// | `DrawIndexed`    | index count     | first index  | draw bindings  |         |
/// | `BufferUpload`   | size            |              | source buffer  | target  |
/// | `BeginRecording` | frame slot      | image index  | pipeline or 0  |         |
/// | `PushConstants`  | stage bits      | offset       | pipeline       |         |
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub op: OpCode,
    pub int0: u64,
    pub int1: u64,
    pub handle0: u64,
    pub handle1: u64,
    payload_len: u8,
    payload: [u8; MAX_INLINE_PAYLOAD],
}

impl Command {
    const EMPTY: Command = Command {
        op: OpCode::None,
        int0: 0,
        int1: 0,
        handle0: 0,
        handle1: 0,
        payload_len: 0,
        payload: [0; MAX_INLINE_PAYLOAD],
    };

    fn with_op(op: OpCode) -> Self {
        Self { op, ..Self::EMPTY }
    }

    pub fn draw(bindings: DrawBindingsId, vertex_count: u32, first_vertex: u32) -> Self {
        Self {
            int0: vertex_count as u64,
            int1: first_vertex as u64,
            handle0: bindings.0,
            ..Self::with_op(OpCode::Draw)
        }
    }

    pub fn draw_indexed(bindings: DrawBindingsId, index_count: u32, first_index: u32) -> Self {
        Self {
            int0: index_count as u64,
            int1: first_index as u64,
            handle0: bindings.0,
            ..Self::with_op(OpCode::DrawIndexed)
        }
    }

    pub fn buffer_upload(src: BufferId, dst: BufferId, size: u64) -> Self {
        Self {
            int0: size,
            handle0: src.0,
            handle1: dst.0,
            ..Self::with_op(OpCode::BufferUpload)
        }
    }

    /// Open the frame slot's buffer; `pipeline` is bound right away
    pub fn begin_recording(frame_index: usize, image_index: u32, pipeline: Option<PipelineId>) -> Self {
        Self {
            int0: frame_index as u64,
            int1: image_index as u64,
            handle0: pipeline.map_or(0, |p| p.0),
            ..Self::with_op(OpCode::BeginRecording)
        }
    }

    pub fn end_recording() -> Self {
        Self::with_op(OpCode::EndRecording)
    }

    pub fn shutdown() -> Self {
        Self::with_op(OpCode::Shutdown)
    }

    /// Push-constant update; `data` must fit the inline payload
    pub fn push_constants(pipeline: PipelineId, stages: StageFlags, offset: u32, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_INLINE_PAYLOAD {
            return Err(Error::SizeMismatch(format!(
                "push-constant update of {} bytes exceeds the {}-byte inline payload",
                data.len(),
                MAX_INLINE_PAYLOAD
            )));
        }
        let mut command = Self {
            int0: stages.bits() as u64,
            int1: offset as u64,
            handle0: pipeline.0,
            payload_len: data.len() as u8,
            ..Self::with_op(OpCode::PushConstants)
        };
        command.payload[..data.len()].copy_from_slice(data);
        Ok(command)
    }

    /// Inline payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }
}

impl Default for Command {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
