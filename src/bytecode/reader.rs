// Unpack direction: the four bytecode passes of one segment.

use std::io::Read;

use super::assemble::{OperandContext, assemble_method};
use super::bands::{BandKind, BandSizes, OperandBands};
use super::{ClassContext, CodeHeader, MethodCodes, UnknownOpcodePolicy};
use crate::classfile::ClassStructure;
use crate::codec::BandReader;
use crate::error::{PackError, Result};

/// Decoded bytecode bands of one segment, ready for reassembly.
#[derive(Debug)]
pub struct BytecodeBands {
    codes: MethodCodes,
    sizes: BandSizes,
    bands: OperandBands,
}

impl BytecodeBands {
    /// Passes 1-3: extract packed codes for the coded methods of `classes`,
    /// size the operand bands, and decode them.
    pub fn read<R: Read>(
        r: &mut BandReader<'_, R>,
        classes: &[ClassStructure],
        policy: UnknownOpcodePolicy,
    ) -> Result<Self> {
        let coded: Vec<usize> = classes
            .iter()
            .map(|c| c.methods.iter().filter(|m| m.has_code()).count())
            .collect();
        let codes = MethodCodes::read(r, &coded)?;
        let sizes = BandSizes::discover(&codes, policy)?;
        log::debug!(
            "bytecode sizes: {} switches, {} wide, labels {}, case counts {}",
            sizes.switches.len(),
            sizes.wide.len(),
            sizes.get(BandKind::Label),
            sizes.get(BandKind::CaseCount)
        );
        let bands = OperandBands::read(r, &sizes)?;
        Ok(Self {
            codes,
            sizes,
            bands,
        })
    }

    pub fn codes(&self) -> &MethodCodes {
        &self.codes
    }

    pub fn bands(&self) -> &OperandBands {
        &self.bands
    }

    /// Pass 4: rebuild the `Code` of every coded method. `headers[c]` holds
    /// the code headers of class `c` in coded-method order.
    pub fn assemble(self, classes: &mut [ClassStructure], headers: &[Vec<CodeHeader>]) -> Result<()> {
        if headers.len() != classes.len() {
            return Err(PackError::mismatch(
                "code_headers",
                format!("{} header sets for {} classes", headers.len(), classes.len()),
            ));
        }
        let mut ops = OperandContext::new(self.bands, self.sizes.wide);

        for (c, (class, class_headers)) in classes.iter_mut().zip(headers).enumerate() {
            let n = self.codes.class_len(c);
            if class_headers.len() != n {
                return Err(PackError::mismatch(
                    "code_headers",
                    format!("class {c}: {} headers for {n} coded methods", class_headers.len()),
                ));
            }
            let built = {
                let ctx = ClassContext::new(class)?;
                let mut built = Vec::with_capacity(n);
                let coded = class.methods.iter().filter(|m| m.has_code());
                for (m, (method, header)) in coded.zip(class_headers).enumerate() {
                    let packed = self.codes.get(c, m).ok_or_else(|| {
                        PackError::mismatch("bc_codes", format!("class {c} method {m} missing"))
                    })?;
                    built.push(assemble_method(packed, header, method, &ctx, &mut ops)?);
                }
                built
            };
            let mut built = built.into_iter();
            for method in class.methods.iter_mut().filter(|m| m.has_code()) {
                method.code = built.next();
            }
        }
        ops.finish()
    }
}
