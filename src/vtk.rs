use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::particle::ParticleStore;

/// Writes the particles as legacy ASCII VTK polydata, one point per particle.
pub fn write_vtk<P: AsRef<Path>>(path: P, particles: &ParticleStore) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_particles(&mut writer, particles)?;
    writer.flush()
}

pub fn write_particles<W: Write>(writer: &mut W, particles: &ParticleStore) -> std::io::Result<()> {
    let n = particles.count();

    writeln!(writer, "# vtk DataFile Version 3.0")?;
    writeln!(writer, "rusty_grains particles")?;
    writeln!(writer, "ASCII")?;
    writeln!(writer, "DATASET POLYDATA")?;

    writeln!(writer, "POINTS {} double", n)?;
    for x in particles.positions() {
        writeln!(writer, "{} {} {}", x.x, x.y, x.z)?;
    }

    writeln!(writer, "POINT_DATA {}", n)?;

    writeln!(writer, "VECTORS velocity double")?;
    for v in particles.velocities() {
        writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
    }

    writeln!(writer, "VECTORS angular_velocity double")?;
    for w in particles.angular_velocities() {
        writeln!(writer, "{} {} {}", w.x, w.y, w.z)?;
    }

    writeln!(writer, "SCALARS radius double 1")?;
    writeln!(writer, "LOOKUP_TABLE default")?;
    for r in particles.radii() {
        writeln!(writer, "{}", r)?;
    }

    writeln!(writer, "SCALARS material int 1")?;
    writeln!(writer, "LOOKUP_TABLE default")?;
    for m in particles.materials() {
        writeln!(writer, "{}", m)?;
    }

    writeln!(writer, "SCALARS id int 1")?;
    writeln!(writer, "LOOKUP_TABLE default")?;
    for i in 0..n {
        writeln!(writer, "{}", i)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Dimension, Particle};
    use glam::DVec3;

    #[test]
    fn writes_one_point_per_particle() {
        let mut store = ParticleStore::new(Dimension::Two);
        store.push(Particle::new(DVec3::new(1.0, 2.0, 0.0), 0.5, 1.0)).unwrap();
        store
            .push(Particle::new(DVec3::new(3.0, 4.0, 0.0), 0.25, 1.0).with_material(2))
            .unwrap();

        let mut out = Vec::new();
        write_particles(&mut out, &store).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("# vtk DataFile Version 3.0\n"));
        assert!(text.contains("POINTS 2 double\n1 2 0\n3 4 0\n"));
        assert!(text.contains("POINT_DATA 2\n"));
        assert!(text.contains("SCALARS radius double 1\nLOOKUP_TABLE default\n0.5\n0.25\n"));
        assert!(text.contains("SCALARS material int 1\nLOOKUP_TABLE default\n0\n2\n"));
    }
}
