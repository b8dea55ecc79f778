//! Fixtures for building signed-looking Cardano transactions.
//!
//! Used by the crate's own tests and by integration tests; other builds see
//! it only with the `test-helpers` feature. Signatures are filler bytes;
//! nothing here is cryptographically valid.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use minicbor::Encoder;

/// 57-byte base address (key hash payment + key hash stake) for `network`,
/// filled with `seed`.
#[must_use]
pub fn test_address(network: u8, seed: u8) -> Vec<u8> {
    let mut address = Vec::with_capacity(57);
    address.push(network & 0x0f);
    address.extend_from_slice(&[seed; 28]);
    address.extend_from_slice(&[seed.wrapping_add(1); 28]);
    address
}

#[derive(Debug, Clone)]
struct OutputSpec {
    address: Vec<u8>,
    lovelace: u64,
    asset: Option<(Vec<u8>, Vec<u8>, u64)>,
}

/// Builder for transaction CBOR.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    inputs: Vec<([u8; 32], u64)>,
    outputs: Vec<OutputSpec>,
    fee: u64,
    ttl: Option<u64>,
    network_id: Option<u8>,
    signatures: usize,
    map_outputs: bool,
}

impl Default for TxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TxBuilder {
    /// Empty transaction with a 0.17 ADA fee and one signature.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            fee: 170_000,
            ttl: None,
            network_id: None,
            signatures: 1,
            map_outputs: false,
        }
    }

    /// Add an input.
    #[must_use]
    pub fn input(mut self, tx_hash: [u8; 32], index: u64) -> Self {
        self.inputs.push((tx_hash, index));
        self
    }

    /// Add an ADA-only output.
    #[must_use]
    pub fn output(mut self, address: &[u8], lovelace: u64) -> Self {
        self.outputs.push(OutputSpec {
            address: address.to_vec(),
            lovelace,
            asset: None,
        });
        self
    }

    /// Add an output holding one native asset.
    #[must_use]
    pub fn token_output(
        mut self,
        address: &[u8],
        lovelace: u64,
        policy_id: &[u8],
        asset_name: &[u8],
        quantity: u64,
    ) -> Self {
        self.outputs.push(OutputSpec {
            address: address.to_vec(),
            lovelace,
            asset: Some((policy_id.to_vec(), asset_name.to_vec(), quantity)),
        });
        self
    }

    /// Set the fee.
    #[must_use]
    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Set the TTL slot.
    #[must_use]
    pub fn ttl(mut self, slot: u64) -> Self {
        self.ttl = Some(slot);
        self
    }

    /// Set the body-level network id.
    #[must_use]
    pub fn network_id(mut self, id: u8) -> Self {
        self.network_id = Some(id);
        self
    }

    /// Number of vkey witnesses.
    #[must_use]
    pub fn signatures(mut self, count: usize) -> Self {
        self.signatures = count;
        self
    }

    /// Encode outputs in the post-Alonzo map form instead of arrays.
    #[must_use]
    pub fn map_outputs(mut self) -> Self {
        self.map_outputs = true;
        self
    }

    /// Encode the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails.
    pub fn build(&self) -> crate::Result<Vec<u8>> {
        self.encode()
            .map_err(|e| crate::Error::Internal(format!("fixture encoding failed: {e}")))
    }

    /// Encode the transaction as base64.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails.
    pub fn to_base64(&self) -> crate::Result<String> {
        self.build().map(|raw| STANDARD.encode(raw))
    }

    fn encode(
        &self,
    ) -> Result<Vec<u8>, minicbor::encode::Error<std::convert::Infallible>> {
        let mut e = Encoder::new(Vec::new());
        e.array(4)?;

        let body_len = 3 + u64::from(self.ttl.is_some()) + u64::from(self.network_id.is_some());
        e.map(body_len)?;

        e.u8(0)?.array(self.inputs.len() as u64)?;
        for (hash, index) in &self.inputs {
            e.array(2)?.bytes(hash)?.u64(*index)?;
        }

        e.u8(1)?.array(self.outputs.len() as u64)?;
        for output in &self.outputs {
            if self.map_outputs {
                e.map(2)?.u8(0)?.bytes(&output.address)?.u8(1)?;
            } else {
                e.array(2)?.bytes(&output.address)?;
            }
            match &output.asset {
                None => {
                    e.u64(output.lovelace)?;
                }
                Some((policy, name, quantity)) => {
                    e.array(2)?.u64(output.lovelace)?;
                    e.map(1)?.bytes(policy)?.map(1)?.bytes(name)?.u64(*quantity)?;
                }
            }
        }

        e.u8(2)?.u64(self.fee)?;
        if let Some(ttl) = self.ttl {
            e.u8(3)?.u64(ttl)?;
        }
        if let Some(id) = self.network_id {
            e.u8(15)?.u8(id)?;
        }

        if self.signatures == 0 {
            e.map(0)?;
        } else {
            e.map(1)?.u8(0)?.array(self.signatures as u64)?;
            for i in 0..self.signatures {
                let filler = u8::try_from(i % 256).unwrap_or(0);
                e.array(2)?.bytes(&[filler; 32])?.bytes(&[filler; 64])?;
            }
        }

        e.bool(true)?.null()?;
        Ok(e.into_writer())
    }
}
