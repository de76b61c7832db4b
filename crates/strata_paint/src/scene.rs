//! Path segment commands
//!
//! Path data inside an aux op is a sequence of records, each a 4-byte contour
//! id followed by a fixed-size command of nine little-endian words.

use strata_core::Point;

use crate::ops::{get_f32, get_u32, put_u32};

/// Size in bytes of an encoded command.
pub const COMMAND_SIZE: usize = 36;

/// Size in bytes of a contour id plus command.
pub const RECORD_SIZE: usize = COMMAND_SIZE + 4;

const CMD_LINE: u32 = 1;
const CMD_QUAD: u32 = 2;
const CMD_CUBIC: u32 = 3;
const CMD_GAP: u32 = 11;

/// Path segment command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Line(Point, Point),
    Quad(Point, Point, Point),
    Cubic(Point, Point, Point, Point),
    /// Implicit segment closing an open contour for filling.
    Gap(Point, Point),
}

impl Command {
    pub fn encode(&self, out: &mut [u8]) {
        let mut words = [0u32; COMMAND_SIZE / 4];
        let mut put = |tag: u32, pts: &[Point]| {
            words[0] = tag;
            for (i, p) in pts.iter().enumerate() {
                words[1 + 2 * i] = p.x.to_bits();
                words[2 + 2 * i] = p.y.to_bits();
            }
        };
        match *self {
            Command::Line(a, b) => put(CMD_LINE, &[a, b]),
            Command::Quad(a, b, c) => put(CMD_QUAD, &[a, b, c]),
            Command::Cubic(a, b, c, d) => put(CMD_CUBIC, &[a, b, c, d]),
            Command::Gap(a, b) => put(CMD_GAP, &[a, b]),
        }
        for (i, w) in words.iter().enumerate() {
            put_u32(&mut out[4 * i..], *w);
        }
    }

    pub fn decode(data: &[u8]) -> Command {
        let pt = |i: usize| Point::new(get_f32(&data[4 + 8 * i..]), get_f32(&data[8 + 8 * i..]));
        match get_u32(data) {
            CMD_LINE => Command::Line(pt(0), pt(1)),
            CMD_QUAD => Command::Quad(pt(0), pt(1), pt(2)),
            CMD_CUBIC => Command::Cubic(pt(0), pt(1), pt(2), pt(3)),
            CMD_GAP => Command::Gap(pt(0), pt(1)),
            other => panic!("unsupported scene command {other}"),
        }
    }
}

/// Iterate over the `(contour, command)` records of path data.
pub fn records(data: &[u8]) -> impl Iterator<Item = (u32, Command)> + '_ {
    data.chunks_exact(RECORD_SIZE)
        .map(|rec| (get_u32(rec), Command::decode(&rec[4..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records() {
        let cmds = [
            (1, Command::Line(Point::new(0.0, 0.0), Point::new(1.0, 2.0))),
            (
                1,
                Command::Cubic(
                    Point::new(1.0, 2.0),
                    Point::new(3.0, 4.0),
                    Point::new(5.0, 6.0),
                    Point::new(7.0, 8.0),
                ),
            ),
            (2, Command::Gap(Point::new(7.0, 8.0), Point::new(0.0, 0.0))),
        ];
        let mut data = vec![0u8; RECORD_SIZE * cmds.len()];
        for (i, (contour, cmd)) in cmds.iter().enumerate() {
            let rec = &mut data[i * RECORD_SIZE..];
            put_u32(rec, *contour);
            cmd.encode(&mut rec[4..]);
        }
        let decoded: Vec<_> = records(&data).collect();
        assert_eq!(decoded, cmds);
    }
}
