//! RunLengthDecode implementation.
//!
//! Run-length encoding according to the PDF specification:
//! - Length byte 0-127: Copy next N+1 bytes literally
//! - Length byte 128: EOD marker
//! - Length byte 129-255: Repeat next byte 257-N times

use crate::decoders::{DecodedStream, StreamFilter};
use crate::error::Result;

const EOD: u8 = 128;
const MAX_RUN: usize = 128;

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder;

impl StreamFilter for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<DecodedStream> {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            let length = input[i];
            i += 1;

            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    if i + count > input.len() {
                        log::warn!(
                            "RunLengthDecode: literal run needs {} bytes, only {} left",
                            count,
                            input.len() - i
                        );
                        return Ok(DecodedStream::truncated(output));
                    }
                    output.extend_from_slice(&input[i..i + count]);
                    i += count;
                },
                128 => return Ok(DecodedStream::complete(output)),
                129..=255 => {
                    let Some(&byte) = input.get(i) else {
                        log::warn!("RunLengthDecode: missing byte for run");
                        return Ok(DecodedStream::truncated(output));
                    };
                    i += 1;
                    output.resize(output.len() + 257 - length as usize, byte);
                },
            }
        }

        Ok(DecodedStream::complete(output))
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() + input.len() / MAX_RUN + 2);
        let mut literal_start = 0;
        let mut i = 0;

        while i < input.len() {
            let byte = input[i];
            let mut run = 1;
            while i + run < input.len() && input[i + run] == byte && run < MAX_RUN {
                run += 1;
            }

            if run >= 2 {
                flush_literals(&mut output, &input[literal_start..i]);
                output.push((257 - run) as u8);
                output.push(byte);
                i += run;
                literal_start = i;
            } else {
                i += 1;
            }
        }
        flush_literals(&mut output, &input[literal_start..]);

        output.push(EOD);
        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}

fn flush_literals(output: &mut Vec<u8>, literals: &[u8]) {
    for chunk in literals.chunks(MAX_RUN) {
        output.push((chunk.len() - 1) as u8);
        output.extend_from_slice(chunk);
    }
}
