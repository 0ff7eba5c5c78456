//! The closed set of analysis signals and bitmask operations over it.
//!
//! An analysis signal is one scalar per sample produced by an in-chain
//! plugin: voicing, pitch, spectral flux and friends. The set is closed by
//! design - adding a signal means growing the bus, so new entries require a
//! capacity bump in [`SIGNAL_COUNT`].

/// Number of analysis signals. Bus lanes are sized by this.
pub const SIGNAL_COUNT: usize = 14;

/// Per-sample analytic signals carried by the analysis signal bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnalysisSignal {
    /// Probability that speech is present at all.
    SpeechPresence = 0,
    /// Continuous voicing score in [0, 1].
    VoicingScore = 1,
    /// Quantized voicing state (0 = unvoiced, 1 = mixed, 2 = voiced).
    VoicingState = 2,
    /// Fricative activity estimate.
    FricativeActivity = 3,
    /// Sibilance band energy.
    SibilanceEnergy = 4,
    /// Onset indicator from high-band flux.
    OnsetFluxHigh = 5,
    /// Fundamental frequency in Hz (0 when unvoiced).
    PitchHz = 6,
    /// Confidence of the pitch estimate in [0, 1].
    PitchConfidence = 7,
    /// First formant frequency in Hz.
    FormantF1 = 8,
    /// Second formant frequency in Hz.
    FormantF2 = 9,
    /// Third formant frequency in Hz.
    FormantF3 = 10,
    /// Confidence of the formant estimates in [0, 1].
    FormantConfidence = 11,
    /// Full-band spectral flux.
    SpectralFlux = 12,
    /// Harmonics-to-noise ratio in dB.
    Hnr = 13,
}

impl AnalysisSignal {
    /// All signals in id order.
    pub const ALL: [AnalysisSignal; SIGNAL_COUNT] = [
        AnalysisSignal::SpeechPresence,
        AnalysisSignal::VoicingScore,
        AnalysisSignal::VoicingState,
        AnalysisSignal::FricativeActivity,
        AnalysisSignal::SibilanceEnergy,
        AnalysisSignal::OnsetFluxHigh,
        AnalysisSignal::PitchHz,
        AnalysisSignal::PitchConfidence,
        AnalysisSignal::FormantF1,
        AnalysisSignal::FormantF2,
        AnalysisSignal::FormantF3,
        AnalysisSignal::FormantConfidence,
        AnalysisSignal::SpectralFlux,
        AnalysisSignal::Hnr,
    ];

    /// Small-integer id of this signal.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Signal for a small-integer id, if in range.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < SIGNAL_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Single-bit mask for this signal.
    #[inline]
    pub const fn bit(self) -> SignalMask {
        SignalMask(1 << self as u16)
    }

    /// Stable display name.
    pub const fn name(self) -> &'static str {
        match self {
            AnalysisSignal::SpeechPresence => "Speech Presence",
            AnalysisSignal::VoicingScore => "Voicing Score",
            AnalysisSignal::VoicingState => "Voicing State",
            AnalysisSignal::FricativeActivity => "Fricative Activity",
            AnalysisSignal::SibilanceEnergy => "Sibilance Energy",
            AnalysisSignal::OnsetFluxHigh => "Onset Flux High",
            AnalysisSignal::PitchHz => "Pitch",
            AnalysisSignal::PitchConfidence => "Pitch Confidence",
            AnalysisSignal::FormantF1 => "Formant F1",
            AnalysisSignal::FormantF2 => "Formant F2",
            AnalysisSignal::FormantF3 => "Formant F3",
            AnalysisSignal::FormantConfidence => "Formant Confidence",
            AnalysisSignal::SpectralFlux => "Spectral Flux",
            AnalysisSignal::Hnr => "HNR",
        }
    }
}

/// Bitmask over the analysis signal set.
///
/// Used for producer declarations, blocker suppression, consumer interest,
/// and the downstream-demand set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalMask(pub u16);

impl SignalMask {
    /// No signals.
    pub const EMPTY: Self = Self(0);
    /// Every signal.
    pub const ALL: Self = Self((1 << SIGNAL_COUNT) - 1);

    /// Build a mask from a list of signals.
    pub const fn of(signals: &[AnalysisSignal]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < signals.len() {
            bits |= 1 << signals[i] as u16;
            i += 1;
        }
        Self(bits)
    }

    /// Whether the mask contains a signal.
    #[inline]
    pub const fn contains(self, signal: AnalysisSignal) -> bool {
        self.0 & (1 << signal as u16) != 0
    }

    /// Whether no signals are set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two masks.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two masks.
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Signals in `self` but not in `other`.
    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterate the signals set in this mask.
    pub fn iter(self) -> impl Iterator<Item = AnalysisSignal> {
        AnalysisSignal::ALL
            .into_iter()
            .filter(move |s| self.contains(*s))
    }
}

/// Per-signal lookup of the nearest upstream producer lane, or -1 if none.
///
/// Recomputed as the chain is walked: each producer slot overwrites the
/// entries for its declared signals, each blocker clears the entries it
/// suppresses. Consumers dispatch bus reads through this map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerMap {
    lanes: [i16; SIGNAL_COUNT],
}

impl ProducerMap {
    /// Map with no producers.
    pub const fn empty() -> Self {
        Self {
            lanes: [-1; SIGNAL_COUNT],
        }
    }

    /// Producer lane for a signal, or `None` if unmapped.
    #[inline]
    pub fn lane(&self, signal: AnalysisSignal) -> Option<usize> {
        let v = self.lanes[signal.index()];
        if v < 0 { None } else { Some(v as usize) }
    }

    /// Raw entry for a signal id (-1 = unmapped). Used when snapshotting.
    #[inline]
    pub fn raw(&self, index: usize) -> i16 {
        self.lanes[index]
    }

    /// Point every signal in `mask` at `lane`.
    pub fn assign(&mut self, mask: SignalMask, lane: usize) {
        for signal in mask.iter() {
            self.lanes[signal.index()] = lane as i16;
        }
    }

    /// Clear every signal in `mask` (downstream sees no producer).
    pub fn block(&mut self, mask: SignalMask) {
        for signal in mask.iter() {
            self.lanes[signal.index()] = -1;
        }
    }

    /// Mask of all currently mapped signals.
    pub fn mapped(&self) -> SignalMask {
        let mut mask = SignalMask::EMPTY;
        for signal in AnalysisSignal::ALL {
            if self.lanes[signal.index()] >= 0 {
                mask = mask.union(signal.bit());
            }
        }
        mask
    }
}

impl Default for ProducerMap {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_ids_are_stable() {
        assert_eq!(AnalysisSignal::SpeechPresence.index(), 0);
        assert_eq!(AnalysisSignal::Hnr.index(), 13);
        for (i, signal) in AnalysisSignal::ALL.iter().enumerate() {
            assert_eq!(signal.index(), i);
            assert_eq!(AnalysisSignal::from_index(i), Some(*signal));
        }
        assert_eq!(AnalysisSignal::from_index(SIGNAL_COUNT), None);
    }

    #[test]
    fn mask_operations() {
        let voicing = SignalMask::of(&[
            AnalysisSignal::VoicingScore,
            AnalysisSignal::VoicingState,
        ]);
        assert!(voicing.contains(AnalysisSignal::VoicingScore));
        assert!(!voicing.contains(AnalysisSignal::PitchHz));

        let pitch = AnalysisSignal::PitchHz.bit();
        let both = voicing.union(pitch);
        assert!(both.contains(AnalysisSignal::PitchHz));
        assert_eq!(both.difference(pitch), voicing);
        assert_eq!(both.intersection(pitch), pitch);
    }

    #[test]
    fn mask_iterates_in_id_order() {
        let mask = SignalMask::of(&[AnalysisSignal::Hnr, AnalysisSignal::SpeechPresence]);
        let signals: Vec<_> = mask.iter().collect();
        assert_eq!(
            signals,
            vec![AnalysisSignal::SpeechPresence, AnalysisSignal::Hnr]
        );
    }

    #[test]
    fn producer_map_assign_and_block() {
        let mut map = ProducerMap::empty();
        assert_eq!(map.lane(AnalysisSignal::PitchHz), None);

        map.assign(AnalysisSignal::PitchHz.bit(), 2);
        assert_eq!(map.lane(AnalysisSignal::PitchHz), Some(2));

        // A nearer producer overwrites.
        map.assign(AnalysisSignal::PitchHz.bit(), 3);
        assert_eq!(map.lane(AnalysisSignal::PitchHz), Some(3));

        map.block(AnalysisSignal::PitchHz.bit());
        assert_eq!(map.lane(AnalysisSignal::PitchHz), None);
        assert_eq!(map.raw(AnalysisSignal::PitchHz.index()), -1);
    }

    #[test]
    fn mapped_mask_tracks_assignments() {
        let mut map = ProducerMap::empty();
        assert!(map.mapped().is_empty());
        map.assign(
            SignalMask::of(&[AnalysisSignal::VoicingScore, AnalysisSignal::PitchHz]),
            0,
        );
        assert_eq!(
            map.mapped(),
            SignalMask::of(&[AnalysisSignal::VoicingScore, AnalysisSignal::PitchHz])
        );
    }
}
