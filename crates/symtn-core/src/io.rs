//! Binary tensor serialisation (host endianness).
//!
//! Layout:
//!
//! ```text
//! magic            4 bytes  "UT10"
//! status           u8       HAVE_BOND | HAVE_ELEM bits
//! scalar kind      u8       0 = real, 1 = complex
//! bond count       u32
//! in-bond count    u32
//! per bond:        direction u8, state count u32,
//!                  per state: u1 i32, parity u8, fermionic parity u8, deg u32
//! labels present   u8
//! labels           i32 each (if present)
//! name             u32 length + utf-8 bytes
//! blocks           if HAVE_ELEM, ascending by charge:
//!                  charge bytes, rows u32, cols u32, rows*cols scalars
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::block::Block;
use crate::bond::{Bond, BondKind, BondState};
use crate::error::{Result, TensorError};
use crate::qnum::{Parity, Qnum};
use crate::scalar::{Scalar, ScalarKind};
use crate::tensor::{SymTensor, HAVE_ELEM};

const MAGIC: &[u8; 4] = b"UT10";

impl<T: Scalar> SymTensor<T> {
    /// Save to a file in the binary tensor format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(MAGIC)?;
        w.write_all(&[self.status()])?;
        w.write_all(&[T::KIND.to_byte()])?;
        write_u32(&mut w, self.bond_num() as u32)?;
        write_u32(&mut w, self.in_bond_num() as u32)?;
        for bond in self.bonds() {
            w.write_all(&[bond.kind().to_byte()])?;
            write_u32(&mut w, bond.states().len() as u32)?;
            for st in bond.states() {
                write_qnum(&mut w, &st.q)?;
                write_u32(&mut w, st.deg as u32)?;
            }
        }
        w.write_all(&[1u8])?;
        for &l in self.labels() {
            w.write_all(&l.to_ne_bytes())?;
        }
        write_u32(&mut w, self.name().len() as u32)?;
        w.write_all(self.name().as_bytes())?;
        if self.has_elem() {
            for (q, block) in self.blocks() {
                write_qnum(&mut w, q)?;
                write_u32(&mut w, block.rows() as u32)?;
                write_u32(&mut w, block.cols() as u32)?;
                for v in block.to_vec() {
                    let (re, im) = v.components();
                    w.write_all(&re.to_ne_bytes())?;
                    if T::KIND == ScalarKind::Complex {
                        w.write_all(&im.to_ne_bytes())?;
                    }
                }
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Load from a file written by [`save`](Self::save).
    ///
    /// Fails with `ScalarKindMismatch` if the file holds the other element
    /// type.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut r = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(TensorError::Format("bad magic".into()));
        }
        let status = read_u8(&mut r)?;
        let kind = ScalarKind::from_byte(read_u8(&mut r)?)
            .ok_or_else(|| TensorError::Format("bad scalar kind".into()))?;
        if kind != T::KIND {
            return Err(TensorError::ScalarKindMismatch {
                found: kind,
                requested: T::KIND,
            });
        }
        let bond_num = read_u32(&mut r)? as usize;
        let in_count = read_u32(&mut r)? as usize;

        let mut bonds = Vec::with_capacity(bond_num);
        for _ in 0..bond_num {
            let kind = BondKind::from_byte(read_u8(&mut r)?)
                .ok_or_else(|| TensorError::Format("bad bond direction".into()))?;
            let state_count = read_u32(&mut r)? as usize;
            let mut states = Vec::with_capacity(state_count);
            for _ in 0..state_count {
                let q = read_qnum(&mut r)?;
                let deg = read_u32(&mut r)? as usize;
                states.push(BondState::new(q, deg));
            }
            bonds.push(Bond::new(kind, states));
        }

        let labels_present = read_u8(&mut r)?;
        let labels: Vec<i32> = if labels_present != 0 {
            let mut labels = Vec::with_capacity(bond_num);
            for _ in 0..bond_num {
                let mut buf = [0u8; 4];
                r.read_exact(&mut buf)?;
                labels.push(i32::from_ne_bytes(buf));
            }
            labels
        } else {
            (0..bond_num as i32).collect()
        };

        let name_len = read_u32(&mut r)? as usize;
        let mut name_buf = vec![0u8; name_len];
        r.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf)
            .map_err(|_| TensorError::Format("tensor name is not utf-8".into()))?;

        let mut tensor = SymTensor::<T>::with_labels(bonds, labels)?;
        if tensor.in_bond_num() != in_count {
            return Err(TensorError::Format(format!(
                "in-bond count {} does not match bond directions ({})",
                in_count,
                tensor.in_bond_num()
            )));
        }
        tensor.set_name(&name);

        if status & HAVE_ELEM != 0 {
            for q in tensor.block_qnums() {
                let file_q = read_qnum(&mut r)?;
                if file_q != q {
                    return Err(TensorError::Format(format!(
                        "expected block {q}, found {file_q}"
                    )));
                }
                let rows = read_u32(&mut r)? as usize;
                let cols = read_u32(&mut r)? as usize;
                let expected = tensor.block(&q).expect("layout block").shape();
                if [rows, cols] != expected {
                    return Err(TensorError::Format(format!(
                        "block {q} has shape [{rows}, {cols}], expected {expected:?}"
                    )));
                }
                let mut data = Vec::with_capacity(rows * cols);
                for _ in 0..rows * cols {
                    let re = read_f64(&mut r)?;
                    let im = if T::KIND == ScalarKind::Complex {
                        read_f64(&mut r)?
                    } else {
                        0.0
                    };
                    data.push(T::from_components(re, im));
                }
                tensor.put_block(q, &Block::from_vec(rows, cols, data), false)?;
            }
        }
        Ok(tensor)
    }
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_ne_bytes())?;
    Ok(())
}

fn write_qnum<W: Write>(w: &mut W, q: &Qnum) -> Result<()> {
    w.write_all(&q.u1_value().to_ne_bytes())?;
    w.write_all(&[q.parity().to_byte(), q.fermionic_parity().to_byte()])?;
    Ok(())
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_ne_bytes(buf))
}

fn read_qnum<R: Read>(r: &mut R) -> Result<Qnum> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    let u1 = i32::from_ne_bytes(buf);
    let prt = Parity::from_byte(read_u8(r)?)
        .ok_or_else(|| TensorError::Format("bad parity byte".into()))?;
    let prt_f = Parity::from_byte(read_u8(r)?)
        .ok_or_else(|| TensorError::Format("bad fermionic parity byte".into()))?;
    Ok(Qnum::new(u1, prt, prt_f))
}
