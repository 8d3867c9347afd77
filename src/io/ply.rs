//! PLY point-cloud writers.
//!
//! The ASCII writer follows the exact grammar downstream tooling parses:
//! header lines in fixed order, then `"%.6f %.6f %.6f %d %d %d"` per point.
//! The binary writer is the enhanced-capability variant; readers that only
//! understand the ASCII grammar must go through the fallback path instead.

use std::io::Write;

use anyhow::Result;

use crate::reconstruction::PointCloud;

/// Write the baseline ASCII PLY representation.
pub fn write_ascii_ply<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "end_header")?;

    for (point, color) in cloud.points.iter().zip(&cloud.colors) {
        writeln!(
            writer,
            "{:.6} {:.6} {:.6} {} {} {}",
            point.x, point.y, point.z, color[0], color[1], color[2]
        )?;
    }
    Ok(())
}

/// Write a binary little-endian PLY representation.
pub fn write_binary_ply<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format binary_little_endian 1.0")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "end_header")?;

    for (point, color) in cloud.points.iter().zip(&cloud.colors) {
        writer.write_all(&(point.x as f32).to_le_bytes())?;
        writer.write_all(&(point.y as f32).to_le_bytes())?;
        writer.write_all(&(point.z as f32).to_le_bytes())?;
        writer.write_all(color)?;
    }
    Ok(())
}
