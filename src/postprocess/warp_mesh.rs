//! Warp mesh files for spherical mirror projection
//!
//! Text format, one record per line:
//!
//! ```text
//! 2              mesh type, 2 is rectangular
//! nx ny          node counts
//! x y u v i      nx * ny nodes, row by row from the bottom
//! ```
//!
//! `x`/`y` is the node position on the projector image, `u`/`v` the texture coordinate it
//! samples from the fisheye image and `i` a brightness multiplier. A negative `i` marks a
//! node outside the mirror's footprint.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarpMeshError {
    #[error("Failed to read warp mesh: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported warp mesh type {0}")]
    UnsupportedType(u32),
    #[error("Malformed warp mesh at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("Warp mesh declares {expected} nodes but contains {found}")]
    NodeCount { expected: usize, found: usize },
}

const RECTANGULAR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpNode {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarpMesh {
    pub nx: usize,
    pub ny: usize,
    /// Row-major, `ny` rows of `nx` nodes, bottom row first
    pub nodes: Vec<WarpNode>,
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    line: usize,
    what: &str,
) -> Result<T, WarpMeshError> {
    let field = field.ok_or_else(|| WarpMeshError::Malformed {
        line,
        reason: format!("missing {}", what),
    })?;
    field.parse().map_err(|_| WarpMeshError::Malformed {
        line,
        reason: format!("invalid {} '{}'", what, field),
    })
}

impl WarpMesh {
    pub fn load(path: &Path) -> Result<Self, WarpMeshError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, WarpMeshError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let (line, header) = lines.next().ok_or(WarpMeshError::Malformed {
            line: 1,
            reason: "empty file".into(),
        })?;
        let mesh_type: u32 = parse_field(Some(header), line, "mesh type")?;
        if mesh_type != RECTANGULAR {
            return Err(WarpMeshError::UnsupportedType(mesh_type));
        }

        let (line, dims) = lines.next().ok_or(WarpMeshError::Malformed {
            line: line + 1,
            reason: "missing dimensions".into(),
        })?;
        let mut fields = dims.split_whitespace();
        let nx: usize = parse_field(fields.next(), line, "nx")?;
        let ny: usize = parse_field(fields.next(), line, "ny")?;
        if nx < 2 || ny < 2 {
            return Err(WarpMeshError::Malformed {
                line,
                reason: format!("mesh must be at least 2x2, got {}x{}", nx, ny),
            });
        }

        let expected = nx.checked_mul(ny).ok_or_else(|| WarpMeshError::Malformed {
            line,
            reason: format!("node count {}x{} overflows", nx, ny),
        })?;

        let mut nodes = Vec::new();
        for (line, record) in lines {
            let mut fields = record.split_whitespace();
            nodes.push(WarpNode {
                x: parse_field(fields.next(), line, "x")?,
                y: parse_field(fields.next(), line, "y")?,
                u: parse_field(fields.next(), line, "u")?,
                v: parse_field(fields.next(), line, "v")?,
                intensity: parse_field(fields.next(), line, "intensity")?,
            });
        }

        if nodes.len() != expected {
            return Err(WarpMeshError::NodeCount {
                expected,
                found: nodes.len(),
            });
        }

        Ok(Self { nx, ny, nodes })
    }

    /// Mesh that maps every point onto itself
    pub fn identity(nx: usize, ny: usize) -> Self {
        let nx = nx.max(2);
        let ny = ny.max(2);
        let mut nodes = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let u = i as f32 / (nx - 1) as f32;
                let v = j as f32 / (ny - 1) as f32;
                nodes.push(WarpNode {
                    x: u * 2.0 - 1.0,
                    y: v * 2.0 - 1.0,
                    u,
                    v,
                    intensity: 1.0,
                });
            }
        }
        Self { nx, ny, nodes }
    }

    pub fn node(&self, i: usize, j: usize) -> &WarpNode {
        &self.nodes[j * self.nx + i]
    }

    /// Bilinear interpolation of (u, v, intensity) at normalized mesh coordinates
    pub fn sample(&self, s: f32, t: f32) -> [f32; 3] {
        let fx = s.clamp(0.0, 1.0) * (self.nx - 1) as f32;
        let fy = t.clamp(0.0, 1.0) * (self.ny - 1) as f32;
        let i0 = (fx.floor() as usize).min(self.nx - 2);
        let j0 = (fy.floor() as usize).min(self.ny - 2);
        let ax = fx - i0 as f32;
        let ay = fy - j0 as f32;

        let lerp = |a: &WarpNode, b: &WarpNode, k: f32| {
            [
                a.u + (b.u - a.u) * k,
                a.v + (b.v - a.v) * k,
                a.intensity + (b.intensity - a.intensity) * k,
            ]
        };
        let bottom = lerp(self.node(i0, j0), self.node(i0 + 1, j0), ax);
        let top = lerp(self.node(i0, j0 + 1), self.node(i0 + 1, j0 + 1), ax);
        [
            bottom[0] + (top[0] - bottom[0]) * ay,
            bottom[1] + (top[1] - bottom[1]) * ay,
            bottom[2] + (top[2] - bottom[2]) * ay,
        ]
    }
}
