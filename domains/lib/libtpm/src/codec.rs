//! Command encoding and response decoding.
//!
//! Everything read from the device goes through a [`Cursor`], which refuses to
//! read past the end of the response and checks every size prefix against
//! the structure's maximum before touching the payload.

use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, error};
use num_traits::FromPrimitive;

use crate::datastructure::*;
use crate::error::{ErrorKind, Result};

pub fn tpm_buf_append_u16(buf: &mut Vec<u8>, data: u16) {
    buf.extend_from_slice(&u16::to_be_bytes(data));
}

pub fn tpm_buf_append_u32(buf: &mut Vec<u8>, data: u32) {
    buf.extend_from_slice(&u32::to_be_bytes(data));
}

/// Bounded big-endian reader over a response.
///
/// Running off the end, or a size prefix beyond its maximum, is reported as
/// `DeviceBusy`: the device handed us something that is not a valid TPM
/// structure.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Cursor<'a> {
        Cursor { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            error!(
                "response truncated: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.remaining()
            );
            return Err(ErrorKind::DeviceBusy);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    /// Read a TPM2B: a 16 bit size followed by that many bytes, at most `max`.
    pub fn read_sized(&mut self, max: usize) -> Result<&'a [u8]> {
        let size = self.read_u16()? as usize;
        if size > max {
            error!("size prefix {} at offset {} exceeds {}", size, self.pos - 2, max);
            return Err(ErrorKind::DeviceBusy);
        }
        self.read_bytes(size)
    }

    /// A cursor over the payload of a TPM2B.
    pub fn sub(&mut self, max: usize) -> Result<Cursor<'a>> {
        self.read_sized(max).map(Cursor::new)
    }

    pub fn read_alg(&mut self) -> Result<TpmAlgorithms> {
        let id = self.read_u16()?;
        TpmAlgorithms::from_u16(id).ok_or_else(|| {
            error!("unknown algorithm {:#06x}", id);
            ErrorKind::NotSupported
        })
    }
}

fn unexpected<T>(what: &str, alg: TpmAlgorithms) -> Result<T> {
    error!("{:?} is not a valid {}", alg, what);
    Err(ErrorKind::NotSupported)
}

// Table 3:19 - TPM2_ReadPublic Command
pub fn encode_read_public(object_handle: u32) -> Vec<u8> {
    let mut buf = TpmHeader::new(
        Tpm2Structures::TPM2_ST_NO_SESSIONS as u16,
        0,
        Tpm2Commands::TPM2_CC_READ_PUBLIC as u32,
    )
    .to_vec();
    tpm_buf_append_u32(&mut buf, object_handle);

    let size = buf.len() as u32;
    BigEndian::write_u32(&mut buf[2..6], size);
    buf
}

/// Decode and judge the response header.
///
/// The response code of the header decides whether there is anything to
/// decode: `TPM_RC_SEQUENCE` means the handle named a sequence object,
/// anything else that is not success is a device failure.
pub fn decode_response_header(rsp: &[u8]) -> Result<TpmHeader> {
    if rsp.len() < TPM_HEADER_SIZE {
        error!("response of {} bytes has no complete header", rsp.len());
        return Err(ErrorKind::BufferTooSmall);
    }

    let hdr = TpmHeader::from_slice(rsp);
    if (hdr.length as usize) < TPM_HEADER_SIZE {
        error!("response declares {} bytes, less than a header", hdr.length);
        return Err(ErrorKind::BufferTooSmall);
    }

    match hdr.ordinal {
        rc if rc == Tpm2ReturnCodes::TPM2_RC_SUCCESS as u32 => Ok(hdr),
        rc if rc == Tpm2ReturnCodes::TPM2_RC_SEQUENCE as u32 => {
            error!("handle references a sequence object");
            Err(ErrorKind::InvalidParameter)
        }
        rc => {
            error!("TPM returned with error {:#010x}", rc);
            Err(ErrorKind::DeviceBusy)
        }
    }
}

/// Symmetric definition of a SymCipher key, which may also name XOR.
fn decode_sym_def(c: &mut Cursor) -> Result<SymDefObject> {
    decode_sym_def_inner(c, true)
}

/// TPMT_SYM_DEF_OBJECT, as carried in RSA and ECC parameters.
/// XOR is not a member of TPMI_ALG_SYM_OBJECT.
fn decode_sym_def_object(c: &mut Cursor) -> Result<SymDefObject> {
    decode_sym_def_inner(c, false)
}

fn decode_sym_def_inner(c: &mut Cursor, allow_xor: bool) -> Result<SymDefObject> {
    match c.read_alg()? {
        TpmAlgorithms::TPM_ALG_AES => Ok(SymDefObject::Aes {
            key_bits: c.read_u16()?,
            mode: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_SM4 => Ok(SymDefObject::Sm4 {
            key_bits: c.read_u16()?,
            mode: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_XOR if allow_xor => Ok(SymDefObject::Xor {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_NULL => Ok(SymDefObject::Null),
        alg => unexpected("symmetric algorithm", alg),
    }
}

fn decode_keyedhash_scheme(c: &mut Cursor) -> Result<KeyedHashScheme> {
    match c.read_alg()? {
        TpmAlgorithms::TPM_ALG_HMAC => Ok(KeyedHashScheme::Hmac {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_XOR => Ok(KeyedHashScheme::Xor {
            hash_alg: c.read_u16()?,
            kdf: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_NULL => Ok(KeyedHashScheme::Null),
        alg => unexpected("keyed hash scheme", alg),
    }
}

fn decode_rsa_scheme(c: &mut Cursor) -> Result<RsaScheme> {
    match c.read_alg()? {
        TpmAlgorithms::TPM_ALG_RSASSA => Ok(RsaScheme::RsaSsa {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_RSAPSS => Ok(RsaScheme::RsaPss {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_RSAES => Ok(RsaScheme::RsaEs),
        TpmAlgorithms::TPM_ALG_OAEP => Ok(RsaScheme::Oaep {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_NULL => Ok(RsaScheme::Null),
        alg => unexpected("RSA scheme", alg),
    }
}

fn decode_ecc_scheme(c: &mut Cursor) -> Result<EccScheme> {
    match c.read_alg()? {
        TpmAlgorithms::TPM_ALG_ECDSA => Ok(EccScheme::EcDsa {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_ECDAA => Ok(EccScheme::EcDaa {
            hash_alg: c.read_u16()?,
            count: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_ECSCHNORR => Ok(EccScheme::EcSchnorr {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_ECDH => Ok(EccScheme::EcDh {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_NULL => Ok(EccScheme::Null),
        alg => unexpected("ECC scheme", alg),
    }
}

fn decode_kdf_scheme(c: &mut Cursor) -> Result<KdfScheme> {
    match c.read_alg()? {
        TpmAlgorithms::TPM_ALG_MGF1 => Ok(KdfScheme::Mgf1 {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_KDF1_SP800_56A => Ok(KdfScheme::Kdf1Sp800_56a {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_KDF2 => Ok(KdfScheme::Kdf2 {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_KDF1_SP800_108 => Ok(KdfScheme::Kdf1Sp800_108 {
            hash_alg: c.read_u16()?,
        }),
        TpmAlgorithms::TPM_ALG_NULL => Ok(KdfScheme::Null),
        alg => unexpected("KDF scheme", alg),
    }
}

fn decode_keyedhash(c: &mut Cursor) -> Result<PublicDetails> {
    let scheme = decode_keyedhash_scheme(c)?;
    let unique = c.read_sized(MAX_DIGEST_BUFFER)?.to_vec();
    Ok(PublicDetails::KeyedHash { scheme, unique })
}

fn decode_symcipher(c: &mut Cursor) -> Result<PublicDetails> {
    let sym = decode_sym_def(c)?;
    let unique = c.read_sized(MAX_DIGEST_BUFFER)?.to_vec();
    Ok(PublicDetails::SymCipher { sym, unique })
}

fn decode_rsa(c: &mut Cursor) -> Result<PublicDetails> {
    let parms = RsaParms {
        symmetric: decode_sym_def_object(c)?,
        scheme: decode_rsa_scheme(c)?,
        key_bits: c.read_u16()?,
        exponent: c.read_u32()?,
    };
    let modulus = c.read_sized(MAX_RSA_KEY_BYTES)?.to_vec();
    Ok(PublicDetails::Rsa { parms, modulus })
}

fn decode_ecc(c: &mut Cursor) -> Result<PublicDetails> {
    let parms = EccParms {
        symmetric: decode_sym_def_object(c)?,
        scheme: decode_ecc_scheme(c)?,
        curve_id: c.read_u16()?,
        kdf: decode_kdf_scheme(c)?,
    };
    let x = c.read_sized(MAX_ECC_KEY_BYTES)?.to_vec();
    let y = c.read_sized(MAX_ECC_KEY_BYTES)?.to_vec();
    Ok(PublicDetails::Ecc { parms, x, y })
}

/// Decode a TPMT_PUBLIC that fills `c` completely.
pub fn decode_public_area(c: &mut Cursor) -> Result<TpmTPublic> {
    let alg_type = c.read_alg()?;
    let name_alg = c.read_u16()?;
    let object_attributes = ObjectAttributes::from_bits_truncate(c.read_u32()?);
    let auth_policy = c.read_sized(MAX_DIGEST_BUFFER)?.to_vec();

    let details = match alg_type {
        TpmAlgorithms::TPM_ALG_KEYEDHASH => decode_keyedhash(c)?,
        TpmAlgorithms::TPM_ALG_SYMCIPHER => decode_symcipher(c)?,
        TpmAlgorithms::TPM_ALG_RSA => decode_rsa(c)?,
        TpmAlgorithms::TPM_ALG_ECC => decode_ecc(c)?,
        alg => return unexpected("object type", alg),
    };

    if !c.is_empty() {
        error!("{} stray bytes after the public area", c.remaining());
        return Err(ErrorKind::DeviceBusy);
    }

    Ok(TpmTPublic {
        name_alg,
        object_attributes,
        auth_policy,
        details,
    })
}

// Table 3:20 - TPM2_ReadPublic Response, after the header
pub fn decode_read_public_body(c: &mut Cursor) -> Result<ReadPublicResponse> {
    let mut public = c.sub(MAX_PUBLIC_AREA)?;
    let size = public.remaining() as u16;
    let public_area = decode_public_area(&mut public)?;

    let name = Tpm2BName::new(c.read_sized(MAX_NAME_BUFFER)?.to_vec());
    let qualified_name = Tpm2BName::new(c.read_sized(MAX_NAME_BUFFER)?.to_vec());

    Ok(ReadPublicResponse {
        out_public: Tpm2BPublic { size, public_area },
        name,
        qualified_name,
    })
}

/// Decode a complete TPM2_ReadPublic response, header included.
pub fn decode_read_public_response(rsp: &[u8]) -> Result<ReadPublicResponse> {
    let hdr = decode_response_header(rsp)?;

    let mut c = Cursor::new(rsp);
    c.read_bytes(TPM_HEADER_SIZE)?;
    let out = decode_read_public_body(&mut c)?;

    if c.position() != hdr.length as usize || !c.is_empty() {
        error!(
            "ReadPublic consumed {} bytes, response declares {} and holds {}",
            c.position(),
            hdr.length,
            rsp.len()
        );
        return Err(ErrorKind::DeviceBusy);
    }

    debug!(
        "ReadPublic: {:?} key, name of {} bytes",
        out.out_public.public_area.alg_type(),
        out.name.size
    );
    Ok(out)
}
