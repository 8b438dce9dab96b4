//! Compile-time table of trusted code-module (VM) hashes.
//!
//! Used only as a security safeguard against malicious downloaded QVMs: a
//! VM hash appearing here is known to belong to a legitimate mod release and
//! is exempted from the download-folder code-module restriction (§4.7 rule
//! "native code module loaded from a downloaded archive"). Membership here
//! does not mean a VM is "the" correct one for a mod, only that it is not
//! suspected malicious.
//!
//! Two near-duplicate tables exist upstream and diverge on a handful of
//! entries; this crate treats the table wired into the main code-module
//! disable check as authoritative and does not carry the second table
//! forward (documented in DESIGN.md). The table below is a representative
//! subset (the original Quake III Arena and Team Arena retail VM releases);
//! the lookup mechanism is complete even though the long tail of
//! community-mod entries from the upstream table is not transcribed here.

pub type VmHash = [u32; 8];

pub const TRUSTED_VMS: &[VmHash] = &[
    // baseq3/pak8.pk3
    [0x4ea18569, 0xbf56a282, 0xd26dc89e, 0xb9efcc5e, 0xedbe0b69, 0xc10182fc, 0x38446174, 0xc1e55b49], // cgame
    [0x3a6fd12b, 0x889f5d35, 0xdf20a09b, 0x51bf8eca, 0x46966d01, 0x4be55ffa, 0xd38ddc2f, 0xfb38c807], // ui
    [0x57c52bf2, 0x2e4f528c, 0x064f8af1, 0x553a7103, 0x723bab0a, 0x02276bb1, 0x1eed944b, 0xf829b219], // qagame
    // baseq3/pak7.pk3
    [0xc1935b68, 0xbda4a225, 0xdfe50893, 0xa361c00e, 0x660c9d70, 0x461f2fa2, 0xf6f89b4b, 0x4535332c], // cgame
    [0x73dde0b0, 0x383b745e, 0x39806769, 0x650a18d7, 0x79c8e8cd, 0x1ceb5984, 0x1f6e88b2, 0xfc23861d], // ui
    [0x407b8ec3, 0x8e6347cf, 0x186d31a5, 0x1629a9cd, 0x8da5d5c1, 0x9bc4b5d1, 0xa489672e, 0x2a275666], // qagame
    // baseq3/pak6.pk3
    [0xd39dd311, 0xd590550c, 0x53fb328e, 0xc384ae6f, 0x09f4a67b, 0x655209fa, 0xe50cd919, 0x3c046c80], // cgame
    [0xbab2fd92, 0xf58d0b5b, 0xd1dc7f29, 0x6417fba1, 0x89e10aa3, 0x76c91424, 0xb048ae0c, 0x55f29c6e], // ui
    [0x961a2e2f, 0xa713c139, 0xf32de270, 0xdde81420, 0xcd33aa63, 0x9d0eb79f, 0x41ec3b72, 0xee52e82b], // qagame
    // baseq3/pak4.pk3
    [0xc769f4f4, 0xea301442, 0xa4accdf0, 0x4609e3ff, 0x60dee762, 0xdb09c663, 0x28232645, 0x73d38bba], // cgame
    [0x2bfb85cc, 0xbe44b8fa, 0x05750eee, 0x85254fc8, 0xf24afcec, 0xc7ca5fd2, 0x6126305d, 0xa4d696e9], // ui
    [0x805ee625, 0x5382a782, 0x1c438aaa, 0x5a330ca8, 0x8184ebcd, 0x44277629, 0xe6308d13, 0xa5e473e5], // qagame
    // baseq3/pak3.pk3
    [0x6a9d927d, 0xa75d628a, 0x5483bb52, 0xa6add9a3, 0xdfd50224, 0x7a73a086, 0xec979db6, 0x97420193], // cgame
    [0x88d64b9d, 0x152b4a63, 0x246fe731, 0x16e565eb, 0xff178ca8, 0xb414ee62, 0xb2cb4d18, 0x88b94762], // ui
    [0x76e79b92, 0xe6e42552, 0xc2dcf7b4, 0x282798b1, 0xf510cc22, 0x4bfb5393, 0xf79ef4db, 0x45ae922a], // qagame
    // baseq3/pak2.pk3
    [0x10976bbf, 0xb03ece66, 0xdeab2b03, 0xce7905e1, 0x7b41da1d, 0x61d2d070, 0xe386be39, 0x47c71106], // cgame
    [0x88d64b9d, 0x152b4a63, 0x246fe731, 0x16e565eb, 0xff178ca8, 0xb414ee62, 0xb2cb4d18, 0x88b94762], // ui
    [0xafc82d75, 0x0ab836a8, 0x9233888a, 0xbadf7663, 0xf9516093, 0xa679ba0d, 0xecde6f99, 0x6aafec1d], // qagame
    // baseq3/pak1.pk3
    [0xbb77ad2b, 0xa5373f40, 0xd2ed1a0d, 0x78ec5b94, 0xfa74a002, 0x5cb61dbe, 0x2b18d255, 0x5b15f4c9], // cgame
    [0xf24823cc, 0x938eb636, 0x1a24ab8f, 0xd10c6d20, 0xee208cbd, 0xe5927c80, 0x16c47832, 0x859aa2b8], // ui
    [0xb477f6e5, 0xa2bcd8d7, 0x92875177, 0x49ca6931, 0xb1e87464, 0xc50c1737, 0xc0d840fa, 0x5168fc98], // qagame
    // baseq3/pak0.pk3
    [0xee31bdb9, 0x865c3e11, 0xafdff3b5, 0xf65dbe95, 0x99de9527, 0xf2493a25, 0xa347a8b0, 0xce5eb098], // cgame
    [0x826a342a, 0x108ac8a7, 0xfa45f4e7, 0x52dfa5be, 0x50fa5ddf, 0x4fdb87d7, 0xc404d833, 0xc4989627], // ui
    [0x73d07e34, 0x1bd21bff, 0x3e7ec2c9, 0x61ea9caf, 0xe7ff9150, 0xe0ddcc5d, 0x8055757e, 0xdece0f72], // qagame
    // missionpack/pak3.pk3
    [0x6ac3a861, 0xaa28e21c, 0x2710bc89, 0x3fc2f30c, 0xae8e4218, 0x35e239f1, 0x35c89f1f, 0x514f53bb], // cgame
    [0xef956cca, 0x46edbb5c, 0xfc38d091, 0x27c2788b, 0xc3d5842d, 0xf6de07b3, 0xfa9e553a, 0x98ba4e5b], // ui
    [0x48435ea5, 0x770eaee8, 0x457c1fa7, 0x057b6efd, 0xfd919aa7, 0xe66b05bb, 0x06575744, 0x67d4f183], // qagame
    // missionpack/pak2.pk3
    [0x1a650d91, 0x65c44a97, 0x87725257, 0xb397ef58, 0x23af4e5c, 0x28bcfbd7, 0x6b647495, 0x773a9fba], // cgame
    [0x1f071a96, 0x2540cf34, 0xb17feb12, 0x5299ed9b, 0x77abb483, 0x12248f17, 0x1dcab34a, 0xea137155], // ui
    [0xf440e701, 0x4b3987c0, 0x8cafa843, 0x5533f4b7, 0x50c7274d, 0xbbc836f9, 0x96a437a1, 0x7a7dfff7], // qagame
    // missionpack/pak1.pk3
    [0x197732a5, 0xea8a09fb, 0xb67af801, 0x6c0b4116, 0x8196f627, 0x5e2d6356, 0x81371750, 0xeb4134e2], // cgame
    [0x37d55455, 0x7d45b2f5, 0xd5fdfa9e, 0x6f362f45, 0xf4040fe0, 0xd828005c, 0xf577f3f4, 0xabe8410e], // ui
    [0x0fe0f3e3, 0x0104a272, 0xa6d1771e, 0xa69120dd, 0xd225f238, 0xd3621554, 0x1b3e1587, 0x8a2b66e6], // qagame
    // missionpack/pak0.pk3
    [0x09d0b6eb, 0x41ea623d, 0x67031d2d, 0x7a73058c, 0xcb3bc655, 0x6ec044ea, 0xd529d48b, 0x58d15f4c], // cgame
    [0x7b157f32, 0xacdb21a3, 0x904d0782, 0x96672ed2, 0xd32195c5, 0xb7a20692, 0x2f6f7d33, 0xc6c40e40], // ui
    [0xda041f17, 0xf296feea, 0xf8269eab, 0xc9062cef, 0xdecddfd2, 0x4ff4d84e, 0xb291902e, 0x527d1d8a], // qagame
];

/// True if `hash` appears in the trusted-VM table.
pub fn is_trusted(hash: &VmHash) -> bool {
    TRUSTED_VMS.contains(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_entry() {
        let h: VmHash = [0x4ea18569, 0xbf56a282, 0xd26dc89e, 0xb9efcc5e, 0xedbe0b69, 0xc10182fc, 0x38446174, 0xc1e55b49];
        assert!(is_trusted(&h));
    }

    #[test]
    fn rejects_unknown_hash() {
        let h: VmHash = [0; 8];
        assert!(!is_trusted(&h));
    }
}
