/*
TPM 2.0 structures carried by the commands this library issues.
Please refer to the individual tables of the specification for more detail:
https://trustedcomputinggroup.org/wp-content/uploads/TCG_TPM2_r1p59_Part2_Structures_pub.pdf
*/

use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};
use core::mem;

pub const TPM_HEADER_SIZE: usize = 10;

// Table 2:23 - TPM_ST
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tpm2Structures {
    TPM2_ST_RSP_COMMAND = 0x00C4,
    TPM2_ST_NO_SESSIONS = 0x8001,
    TPM2_ST_SESSIONS    = 0x8002,
}

// Table 2:12 - TPM_CC
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tpm2Commands {
    TPM2_CC_READ_PUBLIC = 0x0173,
}

// Table 2:16 - TPM_RC
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tpm2ReturnCodes {
    TPM2_RC_SUCCESS  = 0x0000,
    TPM2_RC_SEQUENCE = 0x0103,
}

// Table 2:9 - TPM_ALG_ID
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
pub enum TpmAlgorithms {
    TPM_ALG_ERROR          = 0x0000,
    TPM_ALG_RSA            = 0x0001,
    TPM_ALG_SHA1           = 0x0004,
    TPM_ALG_HMAC           = 0x0005,
    TPM_ALG_AES            = 0x0006,
    TPM_ALG_MGF1           = 0x0007,
    TPM_ALG_KEYEDHASH      = 0x0008,
    TPM_ALG_XOR            = 0x000A,
    TPM_ALG_SHA256         = 0x000B,
    TPM_ALG_SHA384         = 0x000C,
    TPM_ALG_SHA512         = 0x000D,
    TPM_ALG_NULL           = 0x0010,
    TPM_ALG_SM3_256        = 0x0012,
    TPM_ALG_SM4            = 0x0013,
    TPM_ALG_RSASSA         = 0x0014,
    TPM_ALG_RSAES          = 0x0015,
    TPM_ALG_RSAPSS         = 0x0016,
    TPM_ALG_OAEP           = 0x0017,
    TPM_ALG_ECDSA          = 0x0018,
    TPM_ALG_ECDH           = 0x0019,
    TPM_ALG_ECDAA          = 0x001A,
    TPM_ALG_SM2            = 0x001B,
    TPM_ALG_ECSCHNORR      = 0x001C,
    TPM_ALG_KDF1_SP800_56A = 0x0020,
    TPM_ALG_KDF2           = 0x0021,
    TPM_ALG_KDF1_SP800_108 = 0x0022,
    TPM_ALG_ECC            = 0x0023,
    TPM_ALG_SYMCIPHER      = 0x0025,
    TPM_ALG_CTR            = 0x0040,
    TPM_ALG_OFB            = 0x0041,
    TPM_ALG_CBC            = 0x0042,
    TPM_ALG_CFB            = 0x0043,
    TPM_ALG_ECB            = 0x0044,
}

/// sizeof(TPMU_HA), i.e. a SHA-512 digest
pub const MAX_DIGEST_BUFFER: usize = 64;
/// sizeof(TPMU_NAME): a digest with its algorithm id in front
pub const MAX_NAME_BUFFER: usize = mem::size_of::<u16>() + MAX_DIGEST_BUFFER;
pub const MAX_RSA_KEY_BYTES: usize = 512;
/// P-521 coordinates
pub const MAX_ECC_KEY_BYTES: usize = 66;
/// Largest TPMU_PUBLIC_PARMS encoding (ECC with ECDAA)
pub const MAX_PUBLIC_PARMS: usize = 20;
/// Largest TPMT_PUBLIC encoding, an RSA key of the maximum size.
pub const MAX_PUBLIC_AREA: usize = 2 * mem::size_of::<u16>()
    + mem::size_of::<u32>()
    + mem::size_of::<u16>()
    + MAX_DIGEST_BUFFER
    + MAX_PUBLIC_PARMS
    + mem::size_of::<u16>()
    + MAX_RSA_KEY_BYTES;

pub struct TpmHeader {
    pub tag: u16,
    pub length: u32,
    pub ordinal: u32,
}

impl TpmHeader {
    pub fn new(tag: u16, length: u32, ordinal: u32) -> Self {
        Self {
            tag: tag,
            length: length,
            ordinal: ordinal,
        }
    }

    /// `buf` must hold at least `TPM_HEADER_SIZE` bytes.
    pub fn from_slice(buf: &[u8]) -> TpmHeader {
        TpmHeader {
            tag:     BigEndian::read_u16(&buf[0..2]),
            length:  BigEndian::read_u32(&buf[2..6]),
            ordinal: BigEndian::read_u32(&buf[6..10]),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(TPM_HEADER_SIZE);
        buf.extend_from_slice(&u16::to_be_bytes(self.tag));
        buf.extend_from_slice(&u32::to_be_bytes(self.length));
        buf.extend_from_slice(&u32::to_be_bytes(self.ordinal));
        buf
    }
}

bitflags! {
    // Table 2:31 - TPMA_OBJECT
    pub struct ObjectAttributes: u32 {
        const FIXED_TPM              = 1 << 1;
        const ST_CLEAR               = 1 << 2;
        const FIXED_PARENT           = 1 << 4;
        const SENSITIVE_DATA_ORIGIN  = 1 << 5;
        const USER_WITH_AUTH         = 1 << 6;
        const ADMIN_WITH_POLICY      = 1 << 7;
        const NO_DA                  = 1 << 10;
        const ENCRYPTED_DUPLICATION  = 1 << 11;
        const RESTRICTED             = 1 << 16;
        const DECRYPT                = 1 << 17;
        const SIGN_ENCRYPT           = 1 << 18;
    }
}

fn append_alg(buf: &mut Vec<u8>, alg: TpmAlgorithms) {
    buf.extend_from_slice(&u16::to_be_bytes(alg as u16));
}

fn append_sized(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&u16::to_be_bytes(data.len() as u16));
    buf.extend_from_slice(data);
}

// Table 2:140 - TPMT_SYM_DEF_OBJECT
//
// Hash algorithms, key sizes and modes are kept as raw ids; only the
// selectors are interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymDefObject {
    Aes { key_bits: u16, mode: u16 },
    Sm4 { key_bits: u16, mode: u16 },
    Xor { hash_alg: u16 },
    Null,
}

impl SymDefObject {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match *self {
            SymDefObject::Aes { key_bits, mode } | SymDefObject::Sm4 { key_bits, mode } => {
                let alg = match *self {
                    SymDefObject::Aes { .. } => TpmAlgorithms::TPM_ALG_AES,
                    _ => TpmAlgorithms::TPM_ALG_SM4,
                };
                append_alg(&mut buf, alg);
                buf.extend_from_slice(&u16::to_be_bytes(key_bits));
                buf.extend_from_slice(&u16::to_be_bytes(mode));
            }
            SymDefObject::Xor { hash_alg } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_XOR);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
            }
            SymDefObject::Null => append_alg(&mut buf, TpmAlgorithms::TPM_ALG_NULL),
        }
        buf
    }
}

// Table 2:149 - TPMT_KEYEDHASH_SCHEME
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyedHashScheme {
    Hmac { hash_alg: u16 },
    Xor { hash_alg: u16, kdf: u16 },
    Null,
}

impl KeyedHashScheme {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match *self {
            KeyedHashScheme::Hmac { hash_alg } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_HMAC);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
            }
            KeyedHashScheme::Xor { hash_alg, kdf } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_XOR);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
                buf.extend_from_slice(&u16::to_be_bytes(kdf));
            }
            KeyedHashScheme::Null => append_alg(&mut buf, TpmAlgorithms::TPM_ALG_NULL),
        }
        buf
    }
}

// Table 2:166 - TPMT_RSA_SCHEME
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RsaScheme {
    RsaSsa { hash_alg: u16 },
    RsaPss { hash_alg: u16 },
    RsaEs,
    Oaep { hash_alg: u16 },
    Null,
}

impl RsaScheme {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let (alg, hash_alg) = match *self {
            RsaScheme::RsaSsa { hash_alg } => (TpmAlgorithms::TPM_ALG_RSASSA, Some(hash_alg)),
            RsaScheme::RsaPss { hash_alg } => (TpmAlgorithms::TPM_ALG_RSAPSS, Some(hash_alg)),
            RsaScheme::RsaEs => (TpmAlgorithms::TPM_ALG_RSAES, None),
            RsaScheme::Oaep { hash_alg } => (TpmAlgorithms::TPM_ALG_OAEP, Some(hash_alg)),
            RsaScheme::Null => (TpmAlgorithms::TPM_ALG_NULL, None),
        };
        append_alg(&mut buf, alg);
        if let Some(hash_alg) = hash_alg {
            buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
        }
        buf
    }
}

// Table 2:180 - TPMT_ECC_SCHEME
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EccScheme {
    EcDsa { hash_alg: u16 },
    EcDaa { hash_alg: u16, count: u16 },
    EcSchnorr { hash_alg: u16 },
    EcDh { hash_alg: u16 },
    Null,
}

impl EccScheme {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match *self {
            EccScheme::EcDsa { hash_alg } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_ECDSA);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
            }
            EccScheme::EcDaa { hash_alg, count } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_ECDAA);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
                buf.extend_from_slice(&u16::to_be_bytes(count));
            }
            EccScheme::EcSchnorr { hash_alg } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_ECSCHNORR);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
            }
            EccScheme::EcDh { hash_alg } => {
                append_alg(&mut buf, TpmAlgorithms::TPM_ALG_ECDH);
                buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
            }
            EccScheme::Null => append_alg(&mut buf, TpmAlgorithms::TPM_ALG_NULL),
        }
        buf
    }
}

// Table 2:155 - TPMT_KDF_SCHEME
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KdfScheme {
    Mgf1 { hash_alg: u16 },
    Kdf1Sp800_56a { hash_alg: u16 },
    Kdf2 { hash_alg: u16 },
    Kdf1Sp800_108 { hash_alg: u16 },
    Null,
}

impl KdfScheme {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let (alg, hash_alg) = match *self {
            KdfScheme::Mgf1 { hash_alg } => (TpmAlgorithms::TPM_ALG_MGF1, Some(hash_alg)),
            KdfScheme::Kdf1Sp800_56a { hash_alg } => {
                (TpmAlgorithms::TPM_ALG_KDF1_SP800_56A, Some(hash_alg))
            }
            KdfScheme::Kdf2 { hash_alg } => (TpmAlgorithms::TPM_ALG_KDF2, Some(hash_alg)),
            KdfScheme::Kdf1Sp800_108 { hash_alg } => {
                (TpmAlgorithms::TPM_ALG_KDF1_SP800_108, Some(hash_alg))
            }
            KdfScheme::Null => (TpmAlgorithms::TPM_ALG_NULL, None),
        };
        append_alg(&mut buf, alg);
        if let Some(hash_alg) = hash_alg {
            buf.extend_from_slice(&u16::to_be_bytes(hash_alg));
        }
        buf
    }
}

// Table 2:187 - TPMS_RSA_PARMS
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RsaParms {
    pub symmetric: SymDefObject,
    pub scheme: RsaScheme,
    pub key_bits: u16,
    /// Zero selects the default exponent 2^16 + 1.
    pub exponent: u32,
}

// Table 2:188 - TPMS_ECC_PARMS
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EccParms {
    pub symmetric: SymDefObject,
    pub scheme: EccScheme,
    pub curve_id: u16,
    pub kdf: KdfScheme,
}

/// TPMU_PUBLIC_PARMS together with TPMU_PUBLIC_ID, selected by the object
/// type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PublicDetails {
    KeyedHash { scheme: KeyedHashScheme, unique: Vec<u8> },
    SymCipher { sym: SymDefObject, unique: Vec<u8> },
    Rsa { parms: RsaParms, modulus: Vec<u8> },
    Ecc { parms: EccParms, x: Vec<u8>, y: Vec<u8> },
}

impl PublicDetails {
    pub fn alg_type(&self) -> TpmAlgorithms {
        match self {
            PublicDetails::KeyedHash { .. } => TpmAlgorithms::TPM_ALG_KEYEDHASH,
            PublicDetails::SymCipher { .. } => TpmAlgorithms::TPM_ALG_SYMCIPHER,
            PublicDetails::Rsa { .. } => TpmAlgorithms::TPM_ALG_RSA,
            PublicDetails::Ecc { .. } => TpmAlgorithms::TPM_ALG_ECC,
        }
    }

    fn parms_to_vec(&self) -> Vec<u8> {
        match self {
            PublicDetails::KeyedHash { scheme, .. } => scheme.to_vec(),
            PublicDetails::SymCipher { sym, .. } => sym.to_vec(),
            PublicDetails::Rsa { parms, .. } => {
                let mut buf = parms.symmetric.to_vec();
                buf.extend_from_slice(&parms.scheme.to_vec());
                buf.extend_from_slice(&u16::to_be_bytes(parms.key_bits));
                buf.extend_from_slice(&u32::to_be_bytes(parms.exponent));
                buf
            }
            PublicDetails::Ecc { parms, .. } => {
                let mut buf = parms.symmetric.to_vec();
                buf.extend_from_slice(&parms.scheme.to_vec());
                buf.extend_from_slice(&u16::to_be_bytes(parms.curve_id));
                buf.extend_from_slice(&parms.kdf.to_vec());
                buf
            }
        }
    }

    fn unique_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            PublicDetails::KeyedHash { unique, .. } | PublicDetails::SymCipher { unique, .. } => {
                append_sized(&mut buf, unique)
            }
            PublicDetails::Rsa { modulus, .. } => append_sized(&mut buf, modulus),
            PublicDetails::Ecc { x, y, .. } => {
                append_sized(&mut buf, x);
                append_sized(&mut buf, y);
            }
        }
        buf
    }
}

// Table 2:191 - TPMT_PUBLIC
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TpmTPublic {
    pub name_alg: u16,
    pub object_attributes: ObjectAttributes,
    pub auth_policy: Vec<u8>,
    pub details: PublicDetails,
}

impl TpmTPublic {
    pub fn alg_type(&self) -> TpmAlgorithms {
        self.details.alg_type()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        append_alg(&mut buf, self.alg_type());
        buf.extend_from_slice(&u16::to_be_bytes(self.name_alg));
        buf.extend_from_slice(&u32::to_be_bytes(self.object_attributes.bits()));
        append_sized(&mut buf, &self.auth_policy);
        buf.extend_from_slice(&self.details.parms_to_vec());
        buf.extend_from_slice(&self.details.unique_to_vec());
        buf
    }
}

// Table 2:192 - TPM2B_PUBLIC
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tpm2BPublic {
    pub size: u16,
    pub public_area: TpmTPublic,
}

impl Tpm2BPublic {
    pub fn new(public_area: TpmTPublic) -> Self {
        Self {
            size: public_area.to_vec().len() as u16,
            public_area: public_area,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(mem::size_of::<u16>() + self.size as usize);
        buf.extend_from_slice(&u16::to_be_bytes(self.size));
        buf.extend_from_slice(&self.public_area.to_vec());
        buf
    }
}

// Table 2:83 - TPM2B_NAME
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tpm2BName {
    pub size: u16,
    pub name: Vec<u8>,
}

impl Tpm2BName {
    pub fn new(name: Vec<u8>) -> Self {
        Self {
            size: name.len() as u16,
            name: name,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(mem::size_of::<u16>() + self.name.len());
        append_sized(&mut buf, &self.name);
        buf
    }
}

/// Output parameters of TPM2_ReadPublic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadPublicResponse {
    pub out_public: Tpm2BPublic,
    pub name: Tpm2BName,
    pub qualified_name: Tpm2BName,
}
